use std::sync::Arc;

use thiserror::Error as ThisError;
use tracing::{debug, info, warn};

use crate::auth::HtpasswdFile;
use crate::commands;
use crate::connection::{Connection, ReadError};
use crate::protocol::{Error as ProtocolError, Request, Response};
use crate::storage::Storage;

#[derive(Debug, ThisError)]
enum AuthError {
    #[error("Need authentication")]
    NeedAuth,
    #[error("Invalid credentials")]
    InvalidCredentials,
}

/// One connection's state machine. A session without a validator starts
/// authorized; otherwise AUTH must succeed before any storage command is
/// dispatched. Requests are served strictly serially: read one frame, write
/// the full response, repeat.
pub struct Session {
    connection: Connection,
    storage: Arc<dyn Storage>,
    validator: Option<Arc<HtpasswdFile>>,
    is_authorized: bool,
}

impl Session {
    pub fn new(
        connection: Connection,
        storage: Arc<dyn Storage>,
        validator: Option<Arc<HtpasswdFile>>,
    ) -> Session {
        Session {
            connection,
            storage,
            is_authorized: validator.is_none(),
            validator,
        }
    }

    /// Serves requests until the peer disconnects or the connection fails.
    pub async fn serve(mut self) -> crate::Result<()> {
        loop {
            let request = match self.connection.read_request().await {
                Ok(Some(request)) => request,
                Ok(None) => return Ok(()),
                Err(ReadError::Protocol(err)) => {
                    debug!("malformed request: {err}");
                    self.connection
                        .write_response(&Response::Error(err.to_string()))
                        .await?;
                    continue;
                }
                Err(ReadError::UnexpectedEof { body_truncated }) => {
                    if body_truncated {
                        let message = ProtocolError::InvalidValueLength.to_string();
                        // The peer is gone anyway; a failed write changes nothing.
                        let _ = self
                            .connection
                            .write_response(&Response::Error(message))
                            .await;
                    }
                    return Ok(());
                }
                Err(ReadError::Io(err)) => return Err(err.into()),
            };

            debug!(?request, "received request");
            let response = self.handle(request);
            self.connection.write_response(&response).await?;
        }
    }

    fn handle(&mut self, request: Request) -> Response {
        match request {
            // AUTH is routed to the session regardless of state.
            Request::Auth { user, password } => self.authenticate(&user, &password),
            // The request, body included, was already consumed by the
            // parser, so refusing it leaves the framing aligned.
            _ if !self.is_authorized => Response::Error(AuthError::NeedAuth.to_string()),
            request => commands::dispatch(request, self.storage.as_ref()),
        }
    }

    fn authenticate(&mut self, user: &str, password: &str) -> Response {
        match &self.validator {
            Some(validator) if validator.validate(user, password) => {
                self.is_authorized = true;
                info!(user, "authenticated");
                Response::Ok
            }
            Some(_) => {
                warn!(user, "rejected credentials");
                Response::Error(AuthError::InvalidCredentials.to_string())
            }
            // No validator configured; the session is open anyway.
            None => Response::Ok,
        }
    }
}
