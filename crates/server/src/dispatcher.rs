//! Command dispatch (§4.5): maps a decoded `Request` to a handler, executed
//! under the writer lock (§5), producing either a reply or a `Close`
//! signal. Every handler here is a plain function over `&Engine` and
//! `&mut Client` -- no socket I/O happens in this module (§5 "Handler code
//! does not perform network I/O").

use tritedb_engine::{now_epoch_secs, NO_TTL};
use tritedb_protocol::{Response, Tuple};

use crate::client::Client;
use crate::engine::Engine;

/// What the I/O pool should do once a handler returns.
pub enum HandlerSignal {
    Reply(Response),
    /// `QUIT` (§4.5): close the connection, no reply body.
    Close,
}

/// Looks up `db_name`, creating it via `USE`-on-unknown-name semantics is
/// NOT implied here -- only `USE` itself creates databases (§4.2); every
/// other opcode operates against whatever database is already selected,
/// creating it lazily only on a `PUT` (`get_or_create` inside
/// `Registry::point_put`/`prefix_set`).
pub fn dispatch(engine: &Engine, client: &mut Client, request: tritedb_protocol::Request) -> HandlerSignal {
    use tritedb_protocol::Request;

    let now = now_epoch_secs();
    client.last_action_time = now;
    let db = client.selected_db.clone();

    match request {
        Request::Put { prefix, ttl, key, value } => {
            let mut reg = engine.registry.lock();
            if prefix {
                reg.prefix_set(&db, &key, &value, ttl, now);
            } else {
                reg.point_put(&db, &key, value, now);
                if ttl != NO_TTL {
                    reg.point_set_ttl(&db, &key, ttl, now);
                }
            }
            HandlerSignal::Reply(Response::ack(true))
        }

        Request::Get { prefix, key } => {
            let mut reg = engine.registry.lock();
            if prefix {
                let hits = reg.prefix_get(&db, &key, now);
                if hits.is_empty() {
                    HandlerSignal::Reply(Response::ack(false))
                } else {
                    let tuples = hits
                        .into_iter()
                        .map(|(k, item)| Tuple { ttl: item.ttl_seconds, key: k, value: item.data })
                        .collect();
                    HandlerSignal::Reply(Response::Tuples(tuples))
                }
            } else {
                match reg.point_get(&db, &key, now) {
                    Some(item) => HandlerSignal::Reply(Response::Tuple(Tuple {
                        ttl: item.ttl_seconds,
                        key,
                        value: item.data,
                    })),
                    None => HandlerSignal::Reply(Response::ack(false)),
                }
            }
        }

        Request::Del { prefix, key } => {
            let mut reg = engine.registry.lock();
            let deleted = if prefix {
                reg.prefix_delete(&db, &key) > 0
            } else {
                reg.point_delete(&db, &key)
            };
            HandlerSignal::Reply(Response::ack(deleted))
        }

        Request::Ttl { key, ttl } => {
            let mut reg = engine.registry.lock();
            let ok = reg.point_set_ttl(&db, &key, ttl, now);
            HandlerSignal::Reply(Response::ack(ok))
        }

        Request::Inc { prefix, key } => int_mod(engine, &db, prefix, key, 1, now),
        Request::Dec { prefix, key } => int_mod(engine, &db, prefix, key, -1, now),

        Request::Cnt { key } => {
            let reg = engine.registry.lock();
            HandlerSignal::Reply(Response::Count(reg.prefix_count(&db, &key)))
        }

        Request::Use { key } => {
            let name = String::from_utf8_lossy(&key).into_owned();
            {
                let mut reg = engine.registry.lock();
                reg.get_or_create(&name);
            }
            client.selected_db = name;
            HandlerSignal::Reply(Response::ack(true))
        }

        Request::Keys { key } => {
            let mut reg = engine.registry.lock();
            let tuples = reg
                .prefix_get(&db, &key, now)
                .into_iter()
                .map(|(k, item)| Tuple { ttl: item.ttl_seconds, key: k, value: item.data })
                .collect();
            HandlerSignal::Reply(Response::Tuples(tuples))
        }

        Request::Ping => HandlerSignal::Reply(Response::ack(true)),

        Request::Quit => HandlerSignal::Close,

        Request::Db => HandlerSignal::Reply(Response::DbName(client.selected_db.clone())),

        Request::Info => {
            let nkeys = engine.registry.lock().total_keys();
            HandlerSignal::Reply(Response::Info(engine.stats.snapshot(nkeys, &engine.config)))
        }

        Request::Flush => {
            engine.registry.lock().flush(&db);
            HandlerSignal::Reply(Response::ack(true))
        }

        // Cluster join is a stub (§1 non-goals): acknowledge without
        // touching the network/bus.
        Request::Join => HandlerSignal::Reply(Response::ack(true)),
    }
}

fn int_mod(engine: &Engine, db: &str, prefix: bool, key: Vec<u8>, delta: i64, now: u64) -> HandlerSignal {
    let mut reg = engine.registry.lock();
    if prefix {
        reg.prefix_int_mod(db, &key, delta, now);
        HandlerSignal::Reply(Response::ack(true))
    } else {
        let ok = reg.point_int_mod(db, &key, delta, now);
        HandlerSignal::Reply(Response::ack(ok))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tritedb_common::config::Config;
    use tritedb_protocol::{AckCode, Request};

    fn test_engine() -> Engine {
        Engine::new(Config::default())
    }

    #[test]
    fn put_then_get_round_trips() {
        let engine = test_engine();
        let mut client = Client::new(0);
        dispatch(
            &engine,
            &mut client,
            Request::Put { prefix: false, ttl: NO_TTL, key: b"hello".to_vec(), value: b"world".to_vec() },
        );
        let signal = dispatch(&engine, &mut client, Request::Get { prefix: false, key: b"hello".to_vec() });
        match signal {
            HandlerSignal::Reply(Response::Tuple(t)) => {
                assert_eq!(t.ttl, NO_TTL);
                assert_eq!(t.value, b"world");
            }
            _ => panic!("expected a tuple reply"),
        }
    }

    #[test]
    fn prefix_put_does_not_create() {
        let engine = test_engine();
        let mut client = Client::new(0);
        dispatch(
            &engine,
            &mut client,
            Request::Put { prefix: true, ttl: 0, key: b"foo".to_vec(), value: b"10".to_vec() },
        );
        let signal = dispatch(&engine, &mut client, Request::Get { prefix: true, key: b"foo".to_vec() });
        assert!(matches!(signal, HandlerSignal::Reply(Response::Ack(AckCode::Nok))));
    }

    #[test]
    fn prefix_inc_scenario_from_spec() {
        let engine = test_engine();
        let mut client = Client::new(0);
        for (k, v) in [("key1", "0"), ("key2", "1"), ("key3", "2"), ("key4", "9")] {
            dispatch(
                &engine,
                &mut client,
                Request::Put { prefix: false, ttl: NO_TTL, key: k.as_bytes().to_vec(), value: v.as_bytes().to_vec() },
            );
        }
        dispatch(&engine, &mut client, Request::Inc { prefix: true, key: b"key".to_vec() });
        for (k, expected) in [("key1", "1"), ("key2", "2"), ("key3", "3"), ("key4", "10")] {
            let signal = dispatch(&engine, &mut client, Request::Get { prefix: false, key: k.as_bytes().to_vec() });
            match signal {
                HandlerSignal::Reply(Response::Tuple(t)) => assert_eq!(t.value, expected.as_bytes()),
                _ => panic!("expected tuple for {k}"),
            }
        }
    }

    #[test]
    fn use_selects_and_creates_database() {
        let engine = test_engine();
        let mut client = Client::new(0);
        dispatch(&engine, &mut client, Request::Use { key: b"otherdb".to_vec() });
        assert_eq!(client.selected_db, "otherdb");
        let signal = dispatch(&engine, &mut client, Request::Db);
        assert!(matches!(signal, HandlerSignal::Reply(Response::DbName(name)) if name == "otherdb"));
    }

    #[test]
    fn quit_signals_close() {
        let engine = test_engine();
        let mut client = Client::new(0);
        assert!(matches!(dispatch(&engine, &mut client, Request::Quit), HandlerSignal::Close));
    }

    #[test]
    fn cnt_matches_keys_len() {
        let engine = test_engine();
        let mut client = Client::new(0);
        for (k, v) in [("hello", "a"), ("helloworld", "b"), ("hellot", "c"), ("hel", "d")] {
            dispatch(
                &engine,
                &mut client,
                Request::Put { prefix: false, ttl: NO_TTL, key: k.as_bytes().to_vec(), value: v.as_bytes().to_vec() },
            );
        }
        let cnt = match dispatch(&engine, &mut client, Request::Cnt { key: b"hel".to_vec() }) {
            HandlerSignal::Reply(Response::Count(n)) => n,
            _ => panic!("expected count"),
        };
        let keys_len = match dispatch(&engine, &mut client, Request::Keys { key: b"hel".to_vec() }) {
            HandlerSignal::Reply(Response::Tuples(t)) => t.len() as u64,
            _ => panic!("expected tuples"),
        };
        assert_eq!(cnt, keys_len);
    }
}
