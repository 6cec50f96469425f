//! Header and body mutations returned to the proxy after each phase

/// Header name for the request path pseudo-header
pub const PATH_HEADER: &str = ":path";
/// Header name for the response status pseudo-header
pub const STATUS_HEADER: &str = ":status";
pub const CONTENT_TYPE_HEADER: &str = "content-type";
pub const CONTENT_LENGTH_HEADER: &str = "content-length";

/// One header to set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderValueOption {
    pub key: String,
    pub raw_value: Vec<u8>,
}

/// Ordered set of header changes.
///
/// A key is present at most once in `set_headers`; setting it again replaces
/// the value in place so the original position is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMutation {
    pub set_headers: Vec<HeaderValueOption>,
    pub remove_headers: Vec<String>,
}

impl HeaderMutation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a header, overwriting a previous value for the same key
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> &mut Self {
        let key = key.into();
        let raw_value = value.into();
        match self.set_headers.iter_mut().find(|h| h.key == key) {
            Some(existing) => existing.raw_value = raw_value,
            None => self.set_headers.push(HeaderValueOption { key, raw_value }),
        }
        self
    }

    /// Remove a header
    pub fn remove(&mut self, key: impl Into<String>) -> &mut Self {
        let key = key.into();
        if !self.remove_headers.contains(&key) {
            self.remove_headers.push(key);
        }
        self
    }

    /// Value that will be set for `key`, if any
    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.set_headers
            .iter()
            .find(|h| h.key == key)
            .map(|h| h.raw_value.as_slice())
    }

    pub fn is_empty(&self) -> bool {
        self.set_headers.is_empty() && self.remove_headers.is_empty()
    }
}

/// Full replacement of a body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BodyMutation {
    pub body: Vec<u8>,
}

impl BodyMutation {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self { body: body.into() }
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

/// Set `content-length` to the exact size of a replacement body
pub fn set_content_length(headers: &mut HeaderMutation, body: &BodyMutation) {
    headers.set(CONTENT_LENGTH_HEADER, body.len().to_string());
}

/// Header and body mutation pair produced by most phases
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseMutations {
    pub header_mutation: Option<HeaderMutation>,
    pub body_mutation: Option<BodyMutation>,
}

impl PhaseMutations {
    pub fn none() -> Self {
        Self::default()
    }

    /// Replace the body and size it, merging into existing header changes
    pub fn with_body(header_mutation: Option<HeaderMutation>, body: impl Into<Vec<u8>>) -> Self {
        let body = BodyMutation::new(body);
        let mut headers = header_mutation.unwrap_or_default();
        set_content_length(&mut headers, &body);
        Self {
            header_mutation: Some(headers),
            body_mutation: Some(body),
        }
    }

    /// Replace one fragment of a body whose final size is unknown.
    /// `content-length` is removed rather than set.
    pub fn with_fragment(body: impl Into<Vec<u8>>) -> Self {
        let mut headers = HeaderMutation::new();
        headers.remove(CONTENT_LENGTH_HEADER);
        Self {
            header_mutation: Some(headers),
            body_mutation: Some(BodyMutation::new(body)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.header_mutation.as_ref().map_or(true, HeaderMutation::is_empty)
            && self.body_mutation.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_overwrites_in_place() {
        let mut headers = HeaderMutation::new();
        headers.set(PATH_HEADER, "/v1/chat/completions");
        headers.set("x-a", "1");
        headers.set(PATH_HEADER, "/v1/embeddings");

        assert_eq!(headers.set_headers.len(), 2);
        assert_eq!(headers.set_headers[0].key, PATH_HEADER);
        assert_eq!(headers.get(PATH_HEADER), Some(&b"/v1/embeddings"[..]));
    }

    #[test]
    fn test_remove_is_deduplicated() {
        let mut headers = HeaderMutation::new();
        headers.remove(CONTENT_LENGTH_HEADER).remove(CONTENT_LENGTH_HEADER);
        assert_eq!(headers.remove_headers, vec![CONTENT_LENGTH_HEADER.to_string()]);
        assert!(!headers.is_empty());
    }

    #[test]
    fn test_with_body_sets_exact_length() {
        let mut path = HeaderMutation::new();
        path.set(PATH_HEADER, "/v1/messages");

        let mutations = PhaseMutations::with_body(Some(path), "héllo".as_bytes().to_vec());
        let headers = mutations.header_mutation.unwrap();

        assert_eq!(headers.set_headers[0].key, PATH_HEADER);
        assert_eq!(headers.set_headers[1].key, CONTENT_LENGTH_HEADER);
        assert_eq!(headers.get(CONTENT_LENGTH_HEADER), Some(&b"6"[..]));
        assert_eq!(mutations.body_mutation.unwrap().len(), 6);
    }

    #[test]
    fn test_fragment_drops_content_length() {
        let mutations = PhaseMutations::with_fragment(b"data: [DONE]\n\n".to_vec());
        let headers = mutations.header_mutation.unwrap();

        assert!(headers.set_headers.is_empty());
        assert_eq!(headers.remove_headers, vec![CONTENT_LENGTH_HEADER.to_string()]);
        assert_eq!(mutations.body_mutation.unwrap().len(), 14);
    }

    #[test]
    fn test_empty_mutations() {
        assert!(PhaseMutations::none().is_empty());
        let only_empty_headers = PhaseMutations {
            header_mutation: Some(HeaderMutation::new()),
            body_mutation: None,
        };
        assert!(only_empty_headers.is_empty());
    }
}
