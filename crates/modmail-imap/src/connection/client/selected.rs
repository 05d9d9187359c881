//! Implementation for the selected state.

use tokio::io::{AsyncRead, AsyncWrite};

use super::Client;
use super::states::Selected;
use crate::Result;
use crate::command::{Command, FetchAttribute, SearchCriteria};
use crate::parser::{FetchItem, UntaggedResponse};
use crate::types::{SeqNum, Uid};

impl<S> Client<S, Selected>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Searches the selected mailbox.
    ///
    /// Returns sequence numbers in ascending order without duplicates,
    /// however the server ordered them.
    pub async fn search(&mut self, criteria: SearchCriteria) -> Result<Vec<SeqNum>> {
        let responses = self.execute(&Command::Search { criteria }).await?;

        let mut ids: Vec<SeqNum> = responses
            .into_iter()
            .filter_map(|response| match response {
                UntaggedResponse::Search(ids) => Some(ids),
                _ => None,
            })
            .flatten()
            .collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    /// Fetches items for one message by sequence number.
    ///
    /// Unsolicited FETCH data for other messages is ignored; multiple FETCH
    /// responses for the requested message are merged.
    pub async fn fetch(
        &mut self,
        seq: SeqNum,
        items: Vec<FetchAttribute>,
    ) -> Result<Vec<FetchItem>> {
        let responses = self
            .execute(&Command::Fetch {
                id: seq.get(),
                items,
                uid: false,
            })
            .await?;

        Ok(responses
            .into_iter()
            .filter_map(|response| match response {
                UntaggedResponse::Fetch { seq: got, items } if got == seq => Some(items),
                _ => None,
            })
            .flatten()
            .collect())
    }

    /// Fetches items for one message by UID.
    ///
    /// Returns `None` when no message carries the UID. `UID` is always
    /// included in the response, so matching does not depend on the
    /// message's current sequence number.
    pub async fn uid_fetch(
        &mut self,
        uid: Uid,
        items: Vec<FetchAttribute>,
    ) -> Result<Option<Vec<FetchItem>>> {
        let responses = self
            .execute(&Command::Fetch {
                id: uid.get(),
                items,
                uid: true,
            })
            .await?;

        Ok(responses.into_iter().find_map(|response| match response {
            UntaggedResponse::Fetch { items, .. }
                if items.contains(&FetchItem::Uid(uid)) =>
            {
                Some(items)
            }
            _ => None,
        }))
    }
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
    use tokio_test::io::{Builder, Mock};

    fn script() -> Builder {
        let mut builder = Builder::new();
        builder
            .read(b"* OK [CAPABILITY IMAP4rev1] ready\r\n")
            .write(b"A0000 LOGIN alice pw\r\n")
            .read(b"A0000 OK Logged in\r\n")
            .write(b"A0001 SELECT INBOX\r\n")
            .read(b"* 3 EXISTS\r\nA0001 OK [READ-WRITE] done\r\n");
        builder
    }

    async fn selected(mock: Mock) -> Client<Mock, Selected> {
        let client = Client::from_stream(mock)
            .await
            .unwrap()
            .login("alice", "pw")
            .await
            .unwrap();
        client.select("INBOX").await.unwrap().0
    }

    #[tokio::test]
    async fn test_search_sorted() {
        let mock = script()
            .write(b"A0002 SEARCH ALL\r\n")
            .read(b"* SEARCH 3 1 2\r\nA0002 OK done\r\n")
            .build();
        let mut client = selected(mock).await;
        let ids: Vec<u32> = client
            .search(SearchCriteria::All)
            .await
            .unwrap()
            .into_iter()
            .map(SeqNum::get)
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_search_empty_mailbox() {
        let mock = script()
            .write(b"A0002 SEARCH ALL\r\n")
            .read(b"* SEARCH\r\nA0002 OK done\r\n")
            .build();
        let mut client = selected(mock).await;
        assert!(client.search(SearchCriteria::All).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_ignores_other_messages() {
        let mock = script()
            .write(b"A0002 FETCH 2 (FLAGS RFC822)\r\n")
            .read(concat!(
                "* 3 FETCH (FLAGS (\\Deleted))\r\n",
                "* 2 FETCH (FLAGS (\\Seen) RFC822 {4}\r\nbody)\r\n",
                "A0002 OK done\r\n",
            ).as_bytes())
            .build();
        let mut client = selected(mock).await;
        let seq = SeqNum::new(2).unwrap();
        let items = client
            .fetch(seq, vec![FetchAttribute::Flags, FetchAttribute::Rfc822])
            .await
            .unwrap();
        assert_eq!(items.len(), 2);
        match &items[0] {
            FetchItem::Flags(flags) => assert!(flags.contains(&Flag::Seen)),
            other => panic!("expected flags, got {other:?}"),
        }
        assert_eq!(items[1], FetchItem::Rfc822(Some(b"body".to_vec())));
    }

    #[tokio::test]
    async fn test_uid_fetch() {
        let mock = script()
            .write(b"A0002 UID FETCH 4242 RFC822\r\n")
            .read(b"* 3 FETCH (UID 4242 RFC822 {2}\r\nhi)\r\nA0002 OK done\r\n")
            .build();
        let mut client = selected(mock).await;
        let items = client
            .uid_fetch(Uid::new(4242).unwrap(), vec![FetchAttribute::Rfc822])
            .await
            .unwrap()
            .unwrap();
        assert!(items.contains(&FetchItem::Rfc822(Some(b"hi".to_vec()))));
    }

    #[tokio::test]
    async fn test_uid_fetch_unknown_uid() {
        let mock = script()
            .write(b"A0002 UID FETCH 9 RFC822\r\n")
            .read(b"A0002 OK no messages\r\n")
            .build();
        let mut client = selected(mock).await;
        let result = client
            .uid_fetch(Uid::new(9).unwrap(), vec![FetchAttribute::Rfc822])
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_malformed_fetch_is_a_parse_error() {
        let mock = script()
            .write(b"A0002 FETCH 1 FLAGS\r\n")
            .read(b"* 1 FETCH (FLAGS (\\Seen\r\nA0002 OK done\r\n")
            .build();
        let mut client = selected(mock).await;
        let result = client
            .fetch(SeqNum::new(1).unwrap(), vec![FetchAttribute::Flags])
            .await;
        assert!(matches!(result, Err(Error::Parse { .. })));
    }

    #[tokio::test]
    async fn test_logout_from_selected() {
        let mock = script()
            .write(b"A0002 LOGOUT\r\n")
            .read(b"* BYE bye\r\nA0002 OK done\r\n")
            .build();
        let client = selected(mock).await;
        client.logout().await.unwrap();
    }
}
