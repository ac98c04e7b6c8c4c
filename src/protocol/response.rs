//! Response definitions
//!
//! The four reply shapes a client can receive.

/// A reply to send to a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `+<text>\r\n`
    Status(String),

    /// `-<text>\r\n`
    Error(String),

    /// `:<n>\r\n`
    Integer(i64),

    /// `$<len>\r\n<bytes>\r\n`, or `$-1\r\n` for not found
    Bulk(Option<Vec<u8>>),
}

impl Reply {
    pub fn ok() -> Self {
        Reply::Status("OK".to_string())
    }

    pub fn null() -> Self {
        Reply::Bulk(None)
    }

    /// An error reply; line breaks are flattened so the frame stays one line
    pub fn error(message: impl AsRef<str>) -> Self {
        Reply::Error(single_line(message.as_ref()))
    }

    /// Encode in wire format
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Reply::Status(text) => format!("+{}\r\n", single_line(text)).into_bytes(),
            Reply::Error(text) => format!("-{}\r\n", single_line(text)).into_bytes(),
            Reply::Integer(n) => format!(":{}\r\n", n).into_bytes(),
            Reply::Bulk(Some(data)) => {
                let mut out = format!("${}\r\n", data.len()).into_bytes();
                out.extend_from_slice(data);
                out.extend_from_slice(b"\r\n");
                out
            }
            Reply::Bulk(None) => b"$-1\r\n".to_vec(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }
}

fn single_line(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}
