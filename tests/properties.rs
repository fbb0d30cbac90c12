//! Property tests for draining and decoding.

use std::collections::VecDeque;
use std::io::{self, Read, Write};

use proptest::prelude::*;

use gopher::net::{fetch, Connection};
use gopher::{Directory, DirectoryItem, GopherError, Limits, Type};

/// Serves a payload in fixed-size pieces
struct Chunked {
    pieces: VecDeque<Vec<u8>>,
}

impl Chunked {
    fn new(payload: &[u8], size: usize) -> Chunked {
        Chunked {
            pieces: payload.chunks(size).map(<[u8]>::to_vec).collect(),
        }
    }
}

impl Read for Chunked {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.pieces.pop_front() {
            Some(mut piece) => {
                let n = piece.len().min(buf.len());
                buf[..n].copy_from_slice(&piece[..n]);
                if n < piece.len() {
                    self.pieces.push_front(piece.split_off(n));
                }
                Ok(n)
            }
            None => Ok(0),
        }
    }
}

impl Write for Chunked {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Connection for Chunked {}

fn item_type() -> impl Strategy<Value = Type> {
    prop::sample::select(b"0123456789+TgI".to_vec()).prop_map(Type::from_byte)
}

fn text() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 /._:,&-]{0,40}"
}

fn item() -> impl Strategy<Value = DirectoryItem> {
    (item_type(), text(), text(), text(), any::<u16>()).prop_map(
        |(t, display, selector, host, port)| DirectoryItem::new(t, display, selector, host, port),
    )
}

/// Wire lines, some with unknown type bytes, optionally a cut-off tail
fn listing() -> impl Strategy<Value = Vec<u8>> {
    (
        prop::collection::vec((item(), any::<bool>()), 0..40),
        any::<bool>(),
        "[a-z\t]{0,10}",
    )
        .prop_map(|(items, terminated, tail)| {
            let mut wire = Vec::new();
            for (item, junk) in items {
                if junk {
                    wire.extend_from_slice(format!("z{}\r\n", item.display).as_bytes());
                } else {
                    item.write_to(&mut wire).unwrap();
                }
            }
            if terminated {
                wire.extend_from_slice(b".\r\n");
            }
            wire.extend_from_slice(tail.as_bytes());
            wire
        })
}

proptest! {
    #[test]
    fn chunking_does_not_change_entries(payload in listing(), size in 1usize..32) {
        let limits = Limits::default();
        let whole = fetch(&mut Chunked::new(&payload, payload.len().max(1)), "", &limits).unwrap();
        let pieces = fetch(&mut Chunked::new(&payload, size), "", &limits.clone().with_chunk_size(size)).unwrap();
        prop_assert_eq!(whole, pieces);
    }

    #[test]
    fn entry_count_is_capped(payload in listing(), max in 0usize..20) {
        let limits = Limits::default().with_max_entries(max);
        let directory = Directory::parse(&payload, &limits);
        prop_assert!(directory.len() <= max);
    }

    #[test]
    fn items_survive_the_wire(item in item()) {
        let mut wire = Vec::new();
        item.write_to(&mut wire).unwrap();
        prop_assert!(wire.ends_with(b"\r\n"));

        let decoded = DirectoryItem::parse(&wire[..wire.len() - 2], &Limits::default());
        prop_assert_eq!(decoded, Some(item));
    }

    #[test]
    fn oversized_payload_is_fatal(extra in 1usize..64) {
        let limits = Limits::default().with_max_line(16).with_max_entries(4);
        let payload = vec![b'0'; limits.max_response() + extra];
        match fetch(&mut Chunked::new(&payload, 7), "", &limits) {
            Err(GopherError::ResponseTooLarge { limit }) => prop_assert_eq!(limit, 64),
            other => prop_assert!(false, "expected ResponseTooLarge, got {:?}", other),
        }
    }
}
