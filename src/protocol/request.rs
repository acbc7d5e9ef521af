use std::io::Cursor;
use std::str;

use super::{get_line, get_payload, is_valid_key, parse_index, parse_unsigned, Error, CRLF};

/// One client request, parsed from its header line and (for the write
/// commands) the length-prefixed payload that follows it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    Auth { user: String, password: String },
    Keys,
    Ttl { key: String },
    Get { key: String },
    Set { key: String, ttl: u64, value: String },
    Update { key: String, value: String },
    Delete { key: String },
    Expire { key: String, ttl: u64 },
    HashCreate { key: String, ttl: u64 },
    HashGet { key: String, field: String },
    HashSet { key: String, field: String, value: String },
    HashDelete { key: String, field: String },
    HashKeys { key: String },
    HashLen { key: String },
    HashGetAll { key: String },
    ListCreate { key: String, ttl: u64 },
    ListLeftPush { key: String, value: String },
    ListRightPush { key: String, value: String },
    ListLeftPop { key: String },
    ListRightPop { key: String },
    ListLen { key: String },
    ListRange { key: String, start: i64, stop: i64 },
}

impl Request {
    /// Parses one request frame. `Error::Incomplete` means more bytes are
    /// needed; any other error consumed the offending header line so the
    /// connection can keep reading at the next frame boundary.
    pub fn parse(src: &mut Cursor<&[u8]>) -> Result<Request, Error> {
        let line = get_line(src)?;
        let line = str::from_utf8(line).map_err(|_| Error::InvalidCommandFormat)?;

        let mut tokens = line.split(' ');
        let verb = tokens.next().unwrap_or_default();

        let request = match verb {
            "AUTH" => Request::Auth {
                user: next_token(&mut tokens)?,
                password: next_token(&mut tokens)?,
            },
            "KEYS" => Request::Keys,
            "TTL" => Request::Ttl {
                key: next_key(&mut tokens)?,
            },
            "GET" => Request::Get {
                key: next_key(&mut tokens)?,
            },
            "SET" => {
                let key = next_key(&mut tokens)?;
                let ttl = next_unsigned(&mut tokens)?;
                let len = next_unsigned(&mut tokens)?;
                finish(&mut tokens)?;
                let value = read_value(src, len)?;
                return Ok(Request::Set { key, ttl, value });
            }
            "UPD" => {
                let key = next_key(&mut tokens)?;
                let len = next_unsigned(&mut tokens)?;
                finish(&mut tokens)?;
                let value = read_value(src, len)?;
                return Ok(Request::Update { key, value });
            }
            "DEL" => Request::Delete {
                key: next_key(&mut tokens)?,
            },
            "EXPIRE" => Request::Expire {
                key: next_key(&mut tokens)?,
                ttl: next_unsigned(&mut tokens)?,
            },
            "HCREATE" => Request::HashCreate {
                key: next_key(&mut tokens)?,
                ttl: next_unsigned(&mut tokens)?,
            },
            "HGET" => Request::HashGet {
                key: next_key(&mut tokens)?,
                field: next_key(&mut tokens)?,
            },
            "HSET" => {
                let key = next_key(&mut tokens)?;
                let field = next_key(&mut tokens)?;
                let len = next_unsigned(&mut tokens)?;
                finish(&mut tokens)?;
                let value = read_value(src, len)?;
                return Ok(Request::HashSet { key, field, value });
            }
            "HDEL" => Request::HashDelete {
                key: next_key(&mut tokens)?,
                field: next_key(&mut tokens)?,
            },
            "HKEYS" => Request::HashKeys {
                key: next_key(&mut tokens)?,
            },
            "HLEN" => Request::HashLen {
                key: next_key(&mut tokens)?,
            },
            "HGETALL" => Request::HashGetAll {
                key: next_key(&mut tokens)?,
            },
            "LCREATE" => Request::ListCreate {
                key: next_key(&mut tokens)?,
                ttl: next_unsigned(&mut tokens)?,
            },
            "LLPUSH" => {
                let key = next_key(&mut tokens)?;
                let len = next_unsigned(&mut tokens)?;
                finish(&mut tokens)?;
                let value = read_value(src, len)?;
                return Ok(Request::ListLeftPush { key, value });
            }
            "LRPUSH" => {
                let key = next_key(&mut tokens)?;
                let len = next_unsigned(&mut tokens)?;
                finish(&mut tokens)?;
                let value = read_value(src, len)?;
                return Ok(Request::ListRightPush { key, value });
            }
            "LLPOP" => Request::ListLeftPop {
                key: next_key(&mut tokens)?,
            },
            "LRPOP" => Request::ListRightPop {
                key: next_key(&mut tokens)?,
            },
            "LLEN" => Request::ListLen {
                key: next_key(&mut tokens)?,
            },
            "LRANGE" => Request::ListRange {
                key: next_key(&mut tokens)?,
                start: next_index(&mut tokens)?,
                stop: next_index(&mut tokens)?,
            },
            "" => return Err(Error::InvalidCommandFormat),
            _ => return Err(Error::UnknownCommand),
        };

        finish(&mut tokens)?;
        Ok(request)
    }

    pub fn serialize(&self) -> Vec<u8> {
        match self {
            Request::Auth { user, password } => header(format!("AUTH {user} {password}")),
            Request::Keys => header("KEYS".to_string()),
            Request::Ttl { key } => header(format!("TTL {key}")),
            Request::Get { key } => header(format!("GET {key}")),
            Request::Set { key, ttl, value } => {
                with_payload(format!("SET {key} {ttl} {}", value.len()), value)
            }
            Request::Update { key, value } => {
                with_payload(format!("UPD {key} {}", value.len()), value)
            }
            Request::Delete { key } => header(format!("DEL {key}")),
            Request::Expire { key, ttl } => header(format!("EXPIRE {key} {ttl}")),
            Request::HashCreate { key, ttl } => header(format!("HCREATE {key} {ttl}")),
            Request::HashGet { key, field } => header(format!("HGET {key} {field}")),
            Request::HashSet { key, field, value } => {
                with_payload(format!("HSET {key} {field} {}", value.len()), value)
            }
            Request::HashDelete { key, field } => header(format!("HDEL {key} {field}")),
            Request::HashKeys { key } => header(format!("HKEYS {key}")),
            Request::HashLen { key } => header(format!("HLEN {key}")),
            Request::HashGetAll { key } => header(format!("HGETALL {key}")),
            Request::ListCreate { key, ttl } => header(format!("LCREATE {key} {ttl}")),
            Request::ListLeftPush { key, value } => {
                with_payload(format!("LLPUSH {key} {}", value.len()), value)
            }
            Request::ListRightPush { key, value } => {
                with_payload(format!("LRPUSH {key} {}", value.len()), value)
            }
            Request::ListLeftPop { key } => header(format!("LLPOP {key}")),
            Request::ListRightPop { key } => header(format!("LRPOP {key}")),
            Request::ListLen { key } => header(format!("LLEN {key}")),
            Request::ListRange { key, start, stop } => {
                header(format!("LRANGE {key} {start} {stop}"))
            }
        }
    }
}

fn header(line: String) -> Vec<u8> {
    let mut bytes = line.into_bytes();
    bytes.extend_from_slice(CRLF);
    bytes
}

fn with_payload(line: String, value: &str) -> Vec<u8> {
    let mut bytes = header(line);
    bytes.extend_from_slice(value.as_bytes());
    bytes.extend_from_slice(CRLF);
    bytes
}

fn read_value(src: &mut Cursor<&[u8]>, len: usize) -> Result<String, Error> {
    let payload = get_payload(src, len)?;
    str::from_utf8(payload)
        .map(str::to_string)
        .map_err(|_| Error::InvalidCommandFormat)
}

fn next_token<'a>(tokens: &mut impl Iterator<Item = &'a str>) -> Result<String, Error> {
    match tokens.next() {
        Some(token) if !token.is_empty() => Ok(token.to_string()),
        _ => Err(Error::InvalidCommandFormat),
    }
}

fn next_key<'a>(tokens: &mut impl Iterator<Item = &'a str>) -> Result<String, Error> {
    let token = tokens.next().ok_or(Error::InvalidCommandFormat)?;
    if !is_valid_key(token) {
        return Err(Error::InvalidCommandFormat);
    }
    Ok(token.to_string())
}

fn next_unsigned<'a, T: str::FromStr>(
    tokens: &mut impl Iterator<Item = &'a str>,
) -> Result<T, Error> {
    parse_unsigned(tokens.next().ok_or(Error::InvalidCommandFormat)?)
}

fn next_index<'a>(tokens: &mut impl Iterator<Item = &'a str>) -> Result<i64, Error> {
    parse_index(tokens.next().ok_or(Error::InvalidCommandFormat)?)
}

fn finish<'a>(tokens: &mut impl Iterator<Item = &'a str>) -> Result<(), Error> {
    match tokens.next() {
        None => Ok(()),
        Some(_) => Err(Error::InvalidCommandFormat),
    }
}
