//! Implementation for the authenticated state.

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::info;

use super::Client;
use super::states::{Authenticated, Selected};
use crate::Result;
use crate::command::Command;
use crate::parser::UntaggedResponse;
use crate::types::{MailboxStatus, ResponseCode, UidValidity};

impl<S> Client<S, Authenticated>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Selects a mailbox for read-write access.
    pub async fn select(mut self, mailbox: &str) -> Result<(Client<S, Selected>, MailboxStatus)> {
        let responses = self
            .execute(&Command::Select {
                mailbox: mailbox.to_string(),
            })
            .await?;

        let status = parse_mailbox_status(responses);
        info!(
            mailbox,
            exists = status.exists,
            uid_validity = status.uid_validity.map(UidValidity::get),
            "mailbox selected"
        );

        Ok((self.transition(), status))
    }
}

/// Collects the SELECT data into a snapshot.
pub(super) fn parse_mailbox_status(responses: Vec<UntaggedResponse>) -> MailboxStatus {
    let mut status = MailboxStatus::default();

    for response in responses {
        match response {
            UntaggedResponse::Exists(n) => status.exists = n,
            UntaggedResponse::Recent(n) => status.recent = n,
            UntaggedResponse::Flags(flags) => status.flags = flags,
            UntaggedResponse::Ok {
                code: Some(code), ..
            } => match code {
                ResponseCode::UidValidity(v) => status.uid_validity = Some(v),
                ResponseCode::UidNext(v) => status.uid_next = Some(v),
                ResponseCode::Unseen(v) => status.unseen = Some(v),
                ResponseCode::ReadOnly => status.read_only = true,
                _ => {}
            },
            _ => {}
        }
    }

    status
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::types::Flag;
    use tokio_test::io::Builder;

    const GREETING: &[u8] = b"* OK [CAPABILITY IMAP4rev1] ready\r\n";

    async fn logged_in(mock: tokio_test::io::Mock) -> Client<tokio_test::io::Mock, Authenticated> {
        Client::from_stream(mock)
            .await
            .unwrap()
            .login("alice", "pw")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_select_status() {
        let mock = Builder::new()
            .read(GREETING)
            .write(b"A0000 LOGIN alice pw\r\n")
            .read(b"A0000 OK Logged in\r\n")
            .write(b"A0001 SELECT INBOX\r\n")
            .read(concat!(
                "* 172 EXISTS\r\n",
                "* 1 RECENT\r\n",
                "* OK [UNSEEN 12] Message 12 is first unseen\r\n",
                "* OK [UIDVALIDITY 3857529045] UIDs valid\r\n",
                "* OK [UIDNEXT 4392] Predicted next UID\r\n",
                "* FLAGS (\\Answered \\Flagged \\Deleted \\Seen \\Draft)\r\n",
                "* OK [PERMANENTFLAGS (\\Deleted \\Seen \\*)] Limited\r\n",
                "A0001 OK [READ-WRITE] SELECT completed\r\n",
            ).as_bytes())
            .build();

        let client = logged_in(mock).await;
        let (_selected, status) = client.select("INBOX").await.unwrap();
        assert_eq!(status.exists, 172);
        assert_eq!(status.recent, 1);
        assert_eq!(status.unseen.unwrap().get(), 12);
        assert_eq!(status.uid_validity.unwrap().get(), 3857529045);
        assert_eq!(status.uid_next.unwrap().get(), 4392);
        assert!(status.flags.contains(&Flag::Seen));
        assert!(!status.read_only);
    }

    #[tokio::test]
    async fn test_select_missing_mailbox() {
        let mock = Builder::new()
            .read(GREETING)
            .write(b"A0000 LOGIN alice pw\r\n")
            .read(b"A0000 OK Logged in\r\n")
            .write(b"A0001 SELECT INBOX\r\n")
            .read(b"A0001 NO Mailbox doesn't exist\r\n")
            .build();

        let client = logged_in(mock).await;
        let result = client.select("INBOX").await;
        assert!(matches!(result, Err(Error::No(_))));
    }
}
