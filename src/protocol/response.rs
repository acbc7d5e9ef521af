use std::io::Cursor;
use std::str;

use super::{get_line, get_payload, parse_unsigned, Error, CRLF};

/// One server response. `Data` mirrors the wire exactly: an opening `DATA`
/// line, one line per item, and a closing `END` line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
    Ok,
    Len(u64),
    Value(String),
    Data(Vec<DataItem>),
    Error(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DataItem {
    Key(String),
    Value(String),
    Field(String, String),
    Ttl(u64),
}

impl Response {
    pub fn parse(src: &mut Cursor<&[u8]>) -> Result<Response, Error> {
        let line = get_line(src)?;
        let line = str::from_utf8(line).map_err(|_| Error::InvalidResponseFormat)?;

        if line == "OK" {
            return Ok(Response::Ok);
        }
        if let Some(message) = line.strip_prefix("ERROR ") {
            return Ok(Response::Error(message.to_string()));
        }
        if let Some(len) = line.strip_prefix("LEN ") {
            return Ok(Response::Len(parse_unsigned(len)?));
        }
        if let Some(len) = line.strip_prefix("VALUE ") {
            let len = parse_unsigned(len)?;
            return Ok(Response::Value(read_value(src, len)?));
        }
        if line == "DATA" {
            let mut items = Vec::new();
            loop {
                let line = get_line(src)?;
                let line = str::from_utf8(line).map_err(|_| Error::InvalidResponseFormat)?;
                if line == "END" {
                    return Ok(Response::Data(items));
                }
                items.push(DataItem::parse_line(line, src)?);
            }
        }

        Err(Error::InvalidResponseFormat)
    }

    pub fn serialize(&self) -> Vec<u8> {
        match self {
            Response::Ok => b"OK\r\n".to_vec(),
            Response::Len(len) => line(format!("LEN {len}")),
            Response::Value(value) => value_lines(format!("VALUE {}", value.len()), value),
            Response::Data(items) => {
                let mut bytes = b"DATA\r\n".to_vec();
                for item in items {
                    bytes.extend_from_slice(&item.serialize());
                }
                bytes.extend_from_slice(b"END\r\n");
                bytes
            }
            Response::Error(message) => line(format!("ERROR {message}")),
        }
    }
}

impl DataItem {
    fn parse_line(header: &str, src: &mut Cursor<&[u8]>) -> Result<DataItem, Error> {
        if let Some(key) = header.strip_prefix("KEY ") {
            return Ok(DataItem::Key(key.to_string()));
        }
        if let Some(len) = header.strip_prefix("VALUE ") {
            let len = parse_unsigned(len)?;
            return Ok(DataItem::Value(read_value(src, len)?));
        }
        if let Some(rest) = header.strip_prefix("FIELD ") {
            let (field, len) = rest
                .split_once(' ')
                .ok_or(Error::InvalidResponseFormat)?;
            let len = parse_unsigned(len)?;
            return Ok(DataItem::Field(field.to_string(), read_value(src, len)?));
        }
        if let Some(seconds) = header.strip_prefix("TTL ") {
            return Ok(DataItem::Ttl(parse_unsigned(seconds)?));
        }
        Err(Error::InvalidResponseFormat)
    }

    fn serialize(&self) -> Vec<u8> {
        match self {
            DataItem::Key(key) => line(format!("KEY {key}")),
            DataItem::Value(value) => value_lines(format!("VALUE {}", value.len()), value),
            DataItem::Field(field, value) => {
                value_lines(format!("FIELD {field} {}", value.len()), value)
            }
            DataItem::Ttl(seconds) => line(format!("TTL {seconds}")),
        }
    }
}

fn line(header: String) -> Vec<u8> {
    let mut bytes = header.into_bytes();
    bytes.extend_from_slice(CRLF);
    bytes
}

fn value_lines(header: String, value: &str) -> Vec<u8> {
    let mut bytes = line(header);
    bytes.extend_from_slice(value.as_bytes());
    bytes.extend_from_slice(CRLF);
    bytes
}

fn read_value(src: &mut Cursor<&[u8]>, len: usize) -> Result<String, Error> {
    let payload = get_payload(src, len)?;
    str::from_utf8(payload)
        .map(str::to_string)
        .map_err(|_| Error::InvalidResponseFormat)
}
