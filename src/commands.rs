use crate::protocol::{DataItem, Request, Response};
use crate::storage::{self, Storage};

/// Maps one parsed request to a storage operation and wraps the outcome in
/// a wire response. Unknown verbs were already rejected by the parser, and
/// authentication is settled by the session before dispatch.
pub fn dispatch(request: Request, storage: &dyn Storage) -> Response {
    match request {
        Request::Auth { .. } => Response::Ok,
        Request::Keys => keys(storage.keys()),
        Request::Ttl { key } => match storage.ttl(&key) {
            Ok(seconds) => Response::Data(vec![DataItem::Ttl(seconds)]),
            Err(err) => error(err),
        },
        Request::Get { key } => value(storage.get(&key)),
        Request::Set { key, ttl, value } => ok(storage.set(&key, value, ttl)),
        Request::Update { key, value } => ok(storage.update(&key, value)),
        Request::Delete { key } => ok(storage.delete(&key)),
        Request::Expire { key, ttl } => ok(storage.expire(&key, ttl)),
        Request::HashCreate { key, ttl } => ok(storage.hash_create(&key, ttl)),
        Request::HashGet { key, field } => value(storage.hash_get(&key, &field)),
        Request::HashSet { key, field, value } => ok(storage.hash_set(&key, &field, value)),
        Request::HashDelete { key, field } => ok(storage.hash_delete(&key, &field)),
        Request::HashKeys { key } => match storage.hash_keys(&key) {
            Ok(fields) => keys(fields),
            Err(err) => error(err),
        },
        Request::HashLen { key } => len(storage.hash_len(&key)),
        Request::HashGetAll { key } => match storage.hash_get_all(&key) {
            Ok(fields) => Response::Data(
                fields
                    .into_iter()
                    .map(|(field, value)| DataItem::Field(field, value))
                    .collect(),
            ),
            Err(err) => error(err),
        },
        Request::ListCreate { key, ttl } => ok(storage.list_create(&key, ttl)),
        Request::ListLeftPush { key, value } => ok(storage.list_left_push(&key, value)),
        Request::ListRightPush { key, value } => ok(storage.list_right_push(&key, value)),
        Request::ListLeftPop { key } => value(storage.list_left_pop(&key)),
        Request::ListRightPop { key } => value(storage.list_right_pop(&key)),
        Request::ListLen { key } => len(storage.list_len(&key)),
        Request::ListRange { key, start, stop } => match storage.list_range(&key, start, stop) {
            Ok(values) => Response::Data(values.into_iter().map(DataItem::Value).collect()),
            Err(err) => error(err),
        },
    }
}

fn ok(result: storage::Result<()>) -> Response {
    match result {
        Ok(()) => Response::Ok,
        Err(err) => error(err),
    }
}

fn value(result: storage::Result<String>) -> Response {
    match result {
        Ok(value) => Response::Value(value),
        Err(err) => error(err),
    }
}

fn len(result: storage::Result<usize>) -> Response {
    match result {
        Ok(len) => Response::Len(len as u64),
        Err(err) => error(err),
    }
}

fn keys(keys: Vec<String>) -> Response {
    Response::Data(keys.into_iter().map(DataItem::Key).collect())
}

fn error(err: storage::Error) -> Response {
    Response::Error(err.to_string())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::storage::MemoryStorage;

    fn storage() -> MemoryStorage {
        MemoryStorage::new(100, Duration::from_secs(60)).unwrap()
    }

    #[tokio::test]
    async fn set_then_get() {
        let storage = storage();

        let response = dispatch(
            Request::Set {
                key: "key".to_string(),
                ttl: 0,
                value: "value".to_string(),
            },
            &storage,
        );
        assert_eq!(response, Response::Ok);

        let response = dispatch(
            Request::Get {
                key: "key".to_string(),
            },
            &storage,
        );
        assert_eq!(response, Response::Value("value".to_string()));
    }

    #[tokio::test]
    async fn storage_errors_become_their_wire_messages() {
        let storage = storage();

        let response = dispatch(
            Request::Get {
                key: "missing".to_string(),
            },
            &storage,
        );
        assert_eq!(
            response,
            Response::Error("Key does not exist".to_string())
        );

        storage.hash_create("h", 0).unwrap();
        let response = dispatch(
            Request::Get {
                key: "h".to_string(),
            },
            &storage,
        );
        assert_eq!(
            response,
            Response::Error("Key type is not string".to_string())
        );

        let response = dispatch(
            Request::ListLeftPop {
                key: "h".to_string(),
            },
            &storage,
        );
        assert_eq!(
            response,
            Response::Error("Key type is not list".to_string())
        );
    }

    #[tokio::test]
    async fn keys_come_back_as_key_items() {
        let storage = storage();
        storage.set("b", "2".to_string(), 0).unwrap();
        storage.set("a", "1".to_string(), 0).unwrap();

        let response = dispatch(Request::Keys, &storage);
        assert_eq!(
            response,
            Response::Data(vec![
                DataItem::Key("a".to_string()),
                DataItem::Key("b".to_string()),
            ])
        );
    }

    #[tokio::test]
    async fn hash_dump_comes_back_as_field_items() {
        let storage = storage();
        storage.hash_create("h", 0).unwrap();
        storage.hash_set("h", "f", "abc".to_string()).unwrap();

        let response = dispatch(
            Request::HashGetAll {
                key: "h".to_string(),
            },
            &storage,
        );
        assert_eq!(
            response,
            Response::Data(vec![DataItem::Field("f".to_string(), "abc".to_string())])
        );

        let response = dispatch(
            Request::HashLen {
                key: "h".to_string(),
            },
            &storage,
        );
        assert_eq!(response, Response::Len(1));
    }

    #[tokio::test]
    async fn list_range_comes_back_as_value_items() {
        let storage = storage();
        storage.list_create("l", 0).unwrap();
        storage.list_right_push("l", "a".to_string()).unwrap();
        storage.list_left_push("l", "b".to_string()).unwrap();

        let response = dispatch(
            Request::ListRange {
                key: "l".to_string(),
                start: 0,
                stop: 9,
            },
            &storage,
        );
        assert_eq!(
            response,
            Response::Data(vec![
                DataItem::Value("b".to_string()),
                DataItem::Value("a".to_string()),
            ])
        );
    }

    #[tokio::test]
    async fn ttl_comes_back_as_a_ttl_item() {
        let storage = storage();
        storage.set("key", "value".to_string(), 60).unwrap();

        let response = dispatch(
            Request::Ttl {
                key: "key".to_string(),
            },
            &storage,
        );
        let Response::Data(items) = response else {
            panic!("expected DATA response");
        };
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], DataItem::Ttl(seconds) if seconds > 0 && seconds <= 60));
    }
}
