//! Type-state IMAP client connection.
//!
//! The connection states are encoded in the type:
//!
//! - `NotAuthenticated`: after the greeting
//! - `Authenticated`: after LOGIN
//! - `Selected`: after SELECT
//!
//! Each state only exposes the commands valid in it. Transitions consume
//! the client and return it in the new state.

#![allow(clippy::missing_errors_doc)]

mod authenticated;
mod not_authenticated;
mod selected;
mod states;

use std::marker::PhantomData;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, trace};

pub use self::states::{Authenticated, NotAuthenticated, Selected};

use super::framed::FramedStream;
use crate::command::{Command, TagGenerator};
use crate::parser::{Response, ResponseParser, UntaggedResponse};
use crate::types::{Capability, Status};
use crate::{Error, Result};

/// IMAP client connection with type-state.
pub struct Client<S, State> {
    pub(crate) stream: FramedStream<S>,
    pub(crate) tag_gen: TagGenerator,
    pub(crate) capabilities: Vec<Capability>,
    _state: PhantomData<State>,
}

impl<S, State> std::fmt::Debug for Client<S, State> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("tag_gen", &self.tag_gen)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

impl<S, State> Client<S, State>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Returns the server capabilities known so far.
    #[must_use]
    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    /// Checks if the server has a specific capability.
    #[must_use]
    pub fn has_capability(&self, cap: &Capability) -> bool {
        self.capabilities.contains(cap)
    }

    /// Sends CAPABILITY and stores the result.
    pub async fn capability(&mut self) -> Result<Vec<Capability>> {
        self.execute(&Command::Capability).await?;
        Ok(self.capabilities.clone())
    }

    /// Sends LOGOUT and shuts the transport down.
    ///
    /// The server's reply is read but not required: a connection that
    /// drops during LOGOUT has reached the same end.
    pub async fn logout(mut self) -> Result<()> {
        let tag = self.tag_gen.next();
        self.stream
            .write_command(&Command::Logout.serialize(&tag))
            .await?;
        let _ = self.stream.read_until_tagged(&tag).await;
        let _ = self.stream.shutdown().await;
        debug!(tag = %tag, "logged out");
        Ok(())
    }

    /// Moves the connection into another state.
    pub(crate) fn transition<Next>(self) -> Client<S, Next> {
        Client {
            stream: self.stream,
            tag_gen: self.tag_gen,
            capabilities: self.capabilities,
            _state: PhantomData,
        }
    }

    /// Sends a command and waits for its tagged completion.
    ///
    /// Returns the untagged data in arrival order. Capability lists seen on
    /// the way are recorded. A NO, BAD or BYE completion becomes the
    /// matching error, and so does an untagged BYE when the server closes
    /// before completing the command.
    pub(crate) async fn execute(&mut self, command: &Command) -> Result<Vec<UntaggedResponse>> {
        let tag = self.tag_gen.next();
        debug!(tag = %tag, command = command.name(), "sending command");
        self.stream.write_command(&command.serialize(&tag)).await?;

        let raw = self.stream.read_until_tagged(&tag).await?;
        let mut untagged = Vec::with_capacity(raw.len());
        let mut completion = None;

        for bytes in &raw {
            match ResponseParser::parse(bytes)? {
                Response::Untagged(UntaggedResponse::Capability(caps)) => {
                    self.capabilities = caps;
                }
                Response::Untagged(response) => untagged.push(response),
                Response::Tagged {
                    tag: resp_tag,
                    status,
                    text,
                    ..
                } if resp_tag.as_str() == tag => completion = Some((status, text)),
                other => trace!(?other, "ignoring response"),
            }
        }

        let Some((status, text)) = completion else {
            return Err(Error::Protocol("missing tagged response".to_string()));
        };
        debug!(tag = %tag, ?status, responses = untagged.len(), "command completed");

        match status {
            Status::Ok | Status::PreAuth => Ok(untagged),
            Status::No => Err(Error::No(text)),
            Status::Bad => Err(Error::Bad(text)),
            Status::Bye => Err(Error::Bye(text)),
        }
    }
}
