pub mod imap;
pub mod parse;

use std::fmt;

use crate::error::StoreError;

/// Store-assigned message identifier (an IMAP UID).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub u32);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A fetched message. Immutable once built; dropped after its move decision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub subject: String,
    pub senders: Vec<String>,
    pub body: String,
}

impl Message {
    /// Sender addresses joined the way they are handed to the classifier.
    pub fn joined_senders(&self) -> String {
        self.senders.join(",")
    }
}

/// Mailbox operations the pipeline depends on.
pub trait MailStore {
    /// Snapshot of identifiers currently pending in `folder`. Selects the folder.
    fn list_pending(&mut self, folder: &str) -> Result<Vec<MessageId>, StoreError>;

    /// Full content for `ids`. Order is not guaranteed; identifiers that no
    /// longer exist are absent.
    fn fetch_batch(&mut self, ids: &[MessageId]) -> Result<Vec<Message>, StoreError>;

    /// Relocate one message. Not idempotent: a second call for the same id may fail.
    fn move_message(&mut self, id: MessageId, folder: &str) -> Result<(), StoreError>;

    fn list_folders(&mut self) -> Result<Vec<String>, StoreError>;
}
