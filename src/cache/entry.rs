/// Cached value, either one item or an ordered list
///
/// The variant is the entry's `is_list` flag and survives every put/get.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload<V> {
    Single(V),
    List(Vec<V>),
}

impl<V> Payload<V> {
    pub fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::List(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V: Clone> Payload<V> {
    /// Sequence view for list consumers; a single value becomes a one-element list
    pub fn to_list(&self) -> Vec<V> {
        match self {
            Self::Single(value) => vec![value.clone()],
            Self::List(values) => values.clone(),
        }
    }
}

/// A cached entry as seen by readers
#[derive(Debug, Clone, PartialEq)]
pub struct Entry<V> {
    pub tag: String,
    pub payload: Payload<V>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_payload_reads_as_one_element_list() {
        let payload = Payload::Single("latent");
        assert!(!payload.is_list());
        assert_eq!(payload.to_list(), vec!["latent"]);
        assert_eq!(payload.len(), 1);
    }

    #[test]
    fn test_list_payload_is_preserved() {
        let payload = Payload::List(vec![1, 2, 3]);
        assert!(payload.is_list());
        assert_eq!(payload.len(), 3);
        assert_eq!(payload.to_list(), vec![1, 2, 3]);
        assert_ne!(payload, Payload::Single(1));
    }

    #[test]
    fn test_empty_list() {
        let payload: Payload<u8> = Payload::List(Vec::new());
        assert!(payload.is_empty());
        assert!(payload.to_list().is_empty());
    }
}
