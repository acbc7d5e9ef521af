//! Typed client for the cache server: a small lazy connection pool over the
//! same codec the server uses. Every call checks a connection out, writes
//! one request, reads one response and returns the connection to the pool.

use std::sync::Arc;

use thiserror::Error as ThisError;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, Semaphore};

use crate::connection::{Connection, ReadError};
use crate::protocol::{DataItem, Request, Response};

#[derive(Debug, ThisError)]
pub enum ClientError {
    #[error("cannot reach server: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed server response: {0}")]
    Protocol(String),
    /// The server answered with an `ERROR` response.
    #[error("{0}")]
    Server(String),
    #[error("server closed the connection")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    addr: String,
    credentials: Option<(String, String)>,
    idle: Mutex<Vec<Connection>>,
    slots: Semaphore,
}

impl Client {
    /// `max_connections` bounds the pool. Connections are dialed lazily and
    /// authenticated right after connect when credentials are given.
    pub fn new(
        addr: impl Into<String>,
        credentials: Option<(String, String)>,
        max_connections: usize,
    ) -> Client {
        Client {
            inner: Arc::new(ClientInner {
                addr: addr.into(),
                credentials,
                idle: Mutex::new(Vec::new()),
                slots: Semaphore::new(max_connections.max(1)),
            }),
        }
    }

    pub async fn keys(&self) -> Result<Vec<String>> {
        self.call_keys(Request::Keys).await
    }

    /// Remaining lifetime of a key in seconds; zero means it never expires.
    pub async fn ttl(&self, key: &str) -> Result<u64> {
        let items = self.call_data(Request::Ttl { key: key.into() }).await?;
        match items.as_slice() {
            [DataItem::Ttl(seconds)] => Ok(*seconds),
            _ => Err(unexpected_items(&items)),
        }
    }

    pub async fn expire(&self, key: &str, ttl: u64) -> Result<()> {
        self.call_ok(Request::Expire {
            key: key.into(),
            ttl,
        })
        .await
    }

    pub async fn get(&self, key: &str) -> Result<String> {
        self.call_value(Request::Get { key: key.into() }).await
    }

    pub async fn set(&self, key: &str, value: impl Into<String>, ttl: u64) -> Result<()> {
        self.call_ok(Request::Set {
            key: key.into(),
            ttl,
            value: value.into(),
        })
        .await
    }

    pub async fn update(&self, key: &str, value: impl Into<String>) -> Result<()> {
        self.call_ok(Request::Update {
            key: key.into(),
            value: value.into(),
        })
        .await
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        self.call_ok(Request::Delete { key: key.into() }).await
    }

    pub async fn hash_create(&self, key: &str, ttl: u64) -> Result<()> {
        self.call_ok(Request::HashCreate {
            key: key.into(),
            ttl,
        })
        .await
    }

    pub async fn hash_get(&self, key: &str, field: &str) -> Result<String> {
        self.call_value(Request::HashGet {
            key: key.into(),
            field: field.into(),
        })
        .await
    }

    pub async fn hash_set(&self, key: &str, field: &str, value: impl Into<String>) -> Result<()> {
        self.call_ok(Request::HashSet {
            key: key.into(),
            field: field.into(),
            value: value.into(),
        })
        .await
    }

    pub async fn hash_delete(&self, key: &str, field: &str) -> Result<()> {
        self.call_ok(Request::HashDelete {
            key: key.into(),
            field: field.into(),
        })
        .await
    }

    pub async fn hash_len(&self, key: &str) -> Result<u64> {
        self.call_len(Request::HashLen { key: key.into() }).await
    }

    pub async fn hash_keys(&self, key: &str) -> Result<Vec<String>> {
        self.call_keys(Request::HashKeys { key: key.into() }).await
    }

    /// All fields of a hash, sorted by field name.
    pub async fn hash_get_all(&self, key: &str) -> Result<Vec<(String, String)>> {
        let items = self
            .call_data(Request::HashGetAll { key: key.into() })
            .await?;
        items
            .into_iter()
            .map(|item| match item {
                DataItem::Field(field, value) => Ok((field, value)),
                other => Err(unexpected_items(&[other])),
            })
            .collect()
    }

    pub async fn list_create(&self, key: &str, ttl: u64) -> Result<()> {
        self.call_ok(Request::ListCreate {
            key: key.into(),
            ttl,
        })
        .await
    }

    pub async fn list_left_push(&self, key: &str, value: impl Into<String>) -> Result<()> {
        self.call_ok(Request::ListLeftPush {
            key: key.into(),
            value: value.into(),
        })
        .await
    }

    pub async fn list_right_push(&self, key: &str, value: impl Into<String>) -> Result<()> {
        self.call_ok(Request::ListRightPush {
            key: key.into(),
            value: value.into(),
        })
        .await
    }

    pub async fn list_left_pop(&self, key: &str) -> Result<String> {
        self.call_value(Request::ListLeftPop { key: key.into() })
            .await
    }

    pub async fn list_right_pop(&self, key: &str) -> Result<String> {
        self.call_value(Request::ListRightPop { key: key.into() })
            .await
    }

    pub async fn list_len(&self, key: &str) -> Result<u64> {
        self.call_len(Request::ListLen { key: key.into() }).await
    }

    pub async fn list_range(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        let items = self
            .call_data(Request::ListRange {
                key: key.into(),
                start,
                stop,
            })
            .await?;
        items
            .into_iter()
            .map(|item| match item {
                DataItem::Value(value) => Ok(value),
                other => Err(unexpected_items(&[other])),
            })
            .collect()
    }

    async fn call(&self, request: Request) -> Result<Response> {
        let _permit = self
            .inner
            .slots
            .acquire()
            .await
            .expect("connection pool semaphore closed");

        let mut connection = self.checkout().await?;
        let response = roundtrip(&mut connection, &request).await;
        // A connection that failed mid-call is dropped instead of pooled.
        if response.is_ok() {
            self.inner.idle.lock().await.push(connection);
        }

        match response? {
            Response::Error(message) => Err(ClientError::Server(message)),
            response => Ok(response),
        }
    }

    async fn checkout(&self) -> Result<Connection> {
        if let Some(connection) = self.inner.idle.lock().await.pop() {
            return Ok(connection);
        }
        self.connect().await
    }

    async fn connect(&self) -> Result<Connection> {
        let stream = TcpStream::connect(&self.inner.addr).await?;
        let mut connection = Connection::new(stream);

        if let Some((user, password)) = &self.inner.credentials {
            let auth = Request::Auth {
                user: user.clone(),
                password: password.clone(),
            };
            match roundtrip(&mut connection, &auth).await? {
                Response::Ok => {}
                Response::Error(message) => return Err(ClientError::Server(message)),
                other => return Err(unexpected(&other)),
            }
        }

        Ok(connection)
    }

    async fn call_ok(&self, request: Request) -> Result<()> {
        match self.call(request).await? {
            Response::Ok => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    async fn call_value(&self, request: Request) -> Result<String> {
        match self.call(request).await? {
            Response::Value(value) => Ok(value),
            other => Err(unexpected(&other)),
        }
    }

    async fn call_len(&self, request: Request) -> Result<u64> {
        match self.call(request).await? {
            Response::Len(len) => Ok(len),
            other => Err(unexpected(&other)),
        }
    }

    async fn call_data(&self, request: Request) -> Result<Vec<DataItem>> {
        match self.call(request).await? {
            Response::Data(items) => Ok(items),
            other => Err(unexpected(&other)),
        }
    }

    async fn call_keys(&self, request: Request) -> Result<Vec<String>> {
        let items = self.call_data(request).await?;
        items
            .into_iter()
            .map(|item| match item {
                DataItem::Key(key) => Ok(key),
                other => Err(unexpected_items(&[other])),
            })
            .collect()
    }
}

async fn roundtrip(connection: &mut Connection, request: &Request) -> Result<Response> {
    connection.write_request(request).await?;
    match connection.read_response().await {
        Ok(Some(response)) => Ok(response),
        Ok(None) => Err(ClientError::ConnectionClosed),
        Err(ReadError::Io(err)) => Err(ClientError::Io(err)),
        Err(err) => Err(ClientError::Protocol(err.to_string())),
    }
}

fn unexpected(response: &Response) -> ClientError {
    ClientError::Protocol(format!("unexpected response: {response:?}"))
}

fn unexpected_items(items: &[DataItem]) -> ClientError {
    ClientError::Protocol(format!("unexpected data items: {items:?}"))
}
