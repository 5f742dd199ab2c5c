//! Relay frames.

use crate::tag::{ProtocolError, Tag};

/// Transport kind a frame arrived with. Forwarded frames keep it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Text,
    Binary,
}

/// A tag-prefixed relay frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

impl Frame {
    /// Build a frame from a tag and payload.
    pub fn tagged(tag: Tag, payload: &str) -> Self {
        let mut text = String::with_capacity(payload.len() + 1);
        text.push(char::from(tag.as_byte()));
        text.push_str(payload);
        Frame::Text(text)
    }

    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Text(_) => FrameKind::Text,
            Frame::Binary(_) => FrameKind::Binary,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Frame::Text(text) => text.as_bytes(),
            Frame::Binary(bytes) => bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    /// Raw leading byte, if any.
    pub fn tag_byte(&self) -> Option<u8> {
        self.as_bytes().first().copied()
    }

    /// Classify the frame by its leading byte.
    ///
    /// Returns `Ok(None)` for an empty frame.
    pub fn tag(&self) -> Result<Option<Tag>, ProtocolError> {
        self.tag_byte().map(Tag::try_from).transpose()
    }

    /// Bytes after the tag.
    pub fn payload(&self) -> &[u8] {
        self.as_bytes().get(1..).unwrap_or_default()
    }

    /// Replace the leading tag byte.
    ///
    /// Empty frames are returned unchanged. A text frame whose first character
    /// is not ASCII cannot carry a known tag and is returned unchanged as well.
    pub fn retag(self, tag: Tag) -> Self {
        let byte = tag.as_byte();
        match self {
            Frame::Text(mut text) => {
                if text.is_char_boundary(1) {
                    text.replace_range(..1, char::from(byte).encode_utf8(&mut [0; 4]));
                }
                Frame::Text(text)
            }
            Frame::Binary(mut bytes) => {
                if let Some(first) = bytes.first_mut() {
                    *first = byte;
                }
                Frame::Binary(bytes)
            }
        }
    }

    /// Lossy text rendering for logs.
    pub fn display(&self) -> std::borrow::Cow<'_, str> {
        match self {
            Frame::Text(text) => std::borrow::Cow::Borrowed(text),
            Frame::Binary(bytes) => String::from_utf8_lossy(bytes),
        }
    }
}

impl From<String> for Frame {
    fn from(text: String) -> Self {
        Frame::Text(text)
    }
}

impl From<&str> for Frame {
    fn from(text: &str) -> Self {
        Frame::Text(text.to_string())
    }
}

impl From<Vec<u8>> for Frame {
    fn from(bytes: Vec<u8>) -> Self {
        Frame::Binary(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_of_empty_frame() {
        assert_eq!(Frame::from("").tag(), Ok(None));
        assert!(Frame::Binary(Vec::new()).is_empty());
    }

    #[test]
    fn test_tag_classification() {
        assert_eq!(Frame::from("!").tag(), Ok(Some(Tag::Heartbeat)));
        assert_eq!(Frame::from("~hello").tag(), Ok(Some(Tag::Rebroadcast)));
        assert_eq!(Frame::from(".hello").tag(), Ok(Some(Tag::Plain)));
        assert_eq!(
            Frame::from("ping").tag(),
            Err(ProtocolError::UnknownTag(b'p'))
        );
    }

    #[test]
    fn test_retag_text() {
        let frame = Frame::from("~hello").retag(Tag::Plain);
        assert_eq!(frame, Frame::from(".hello"));
        assert_eq!(frame.payload(), b"hello");
    }

    #[test]
    fn test_retag_binary_keeps_kind() {
        let frame = Frame::from(vec![b'~', 0xff, 0x00]).retag(Tag::Plain);
        assert_eq!(frame.kind(), FrameKind::Binary);
        assert_eq!(frame.as_bytes(), &[b'.', 0xff, 0x00]);
    }

    #[test]
    fn test_retag_non_ascii_text_unchanged() {
        let frame = Frame::from("éa").retag(Tag::Plain);
        assert_eq!(frame, Frame::from("éa"));
    }

    #[test]
    fn test_tagged_builder() {
        assert_eq!(Frame::tagged(Tag::Rebroadcast, "pos 1 2"), Frame::from("~pos 1 2"));
        assert_eq!(Frame::tagged(Tag::Heartbeat, ""), Frame::from("!"));
    }
}
