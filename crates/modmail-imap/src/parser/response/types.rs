//! Response data types.

use crate::types::{Capability, Flags, ResponseCode, SeqNum, Uid};

/// Untagged server data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UntaggedResponse {
    /// `* OK`.
    Ok {
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// `* NO`.
    No {
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// `* BAD`.
    Bad {
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// `* PREAUTH` greeting.
    PreAuth {
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// `* BYE`.
    Bye {
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// `* CAPABILITY ...`.
    Capability(Vec<Capability>),
    /// `* FLAGS (...)`.
    Flags(Flags),
    /// `* n EXISTS`.
    Exists(u32),
    /// `* n RECENT`.
    Recent(u32),
    /// `* n EXPUNGE`.
    Expunge(SeqNum),
    /// `* SEARCH ...`, in server order.
    Search(Vec<SeqNum>),
    /// `* n FETCH (...)`.
    Fetch {
        /// Sequence number of the message.
        seq: SeqNum,
        /// Data items in server order.
        items: Vec<FetchItem>,
    },
    /// Any other untagged data, by keyword. Kept so that servers sending
    /// extensions (LIST, STATUS, ENABLED, ...) do not break the session.
    Other(String),
}

/// A data item in a FETCH response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchItem {
    /// `FLAGS`.
    Flags(Flags),
    /// `UID`.
    Uid(Uid),
    /// `INTERNALDATE`, unparsed (`17-Jul-1996 02:44:25 -0700`).
    InternalDate(String),
    /// `RFC822.SIZE`.
    Rfc822Size(u32),
    /// `RFC822`: the full message, `None` for NIL.
    Rfc822(Option<Vec<u8>>),
    /// `BODY[section]<origin>`.
    Body {
        /// Section specifier, empty for the whole message.
        section: String,
        /// Partial fetch origin.
        origin: Option<u32>,
        /// Body data, `None` for NIL.
        data: Option<Vec<u8>>,
    },
}
