//! Content identifier scanning over raw byte buffers.
//!
//! Directory entries are opaque blobs that embed CIDs as text. The scanner
//! walks a buffer looking for maximal runs of ASCII alphanumerics and keeps
//! every run that decodes as a CID (CIDv0 base58btc or multibase CIDv1).

use cid::Cid;
use std::iter::FusedIterator;

/// Longest alphanumeric run that is still considered a CID candidate.
pub const MAX_CID_TEXT_LEN: usize = 128;

/// One CID located inside a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CidMatch {
    /// Byte offset of the first character of the match.
    pub start: usize,
    /// Byte offset one past the last character of the match.
    pub end: usize,
    /// The decoded identifier.
    pub cid: Cid,
}

/// Finds the first CID in `buf`.
///
/// Returns `None` when the buffer holds no decodable identifier. Offsets in
/// the returned match are relative to `buf`.
pub fn find_next_cid(buf: &[u8]) -> Option<CidMatch> {
    let mut pos = 0;
    while pos < buf.len() {
        let start = pos + buf[pos..].iter().position(|b| b.is_ascii_alphanumeric())?;
        let end = buf[start..]
            .iter()
            .position(|b| !b.is_ascii_alphanumeric())
            .map_or(buf.len(), |off| start + off);

        if end - start <= MAX_CID_TEXT_LEN {
            if let Some(cid) = decode_candidate(&buf[start..end]) {
                return Some(CidMatch { start, end, cid });
            }
        }
        pos = end;
    }
    None
}

fn decode_candidate(run: &[u8]) -> Option<Cid> {
    // Runs are pure ASCII, so the UTF-8 view cannot fail.
    let text = std::str::from_utf8(run).ok()?;
    Cid::try_from(text).ok()
}

/// Lazy iterator over the CIDs embedded in a buffer, in offset order.
///
/// Cloning a scanner snapshots its cursor, and [`CidScanner::restart`]
/// rewinds it to the start of the buffer.
#[derive(Debug, Clone)]
pub struct CidScanner<'a> {
    buf: &'a [u8],
    cursor: usize,
}

impl<'a> CidScanner<'a> {
    /// Create a scanner positioned at the start of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, cursor: 0 }
    }

    /// Byte offset where the next search will begin.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Rewind to the start of the buffer.
    pub fn restart(&mut self) {
        self.cursor = 0;
    }
}

impl Iterator for CidScanner<'_> {
    type Item = Cid;

    fn next(&mut self) -> Option<Cid> {
        if self.cursor >= self.buf.len() {
            return None;
        }
        match find_next_cid(&self.buf[self.cursor..]) {
            Some(m) => {
                self.cursor += m.end;
                Some(m.cid)
            }
            None => {
                self.cursor = self.buf.len();
                None
            }
        }
    }
}

impl FusedIterator for CidScanner<'_> {}

/// Collect every CID embedded in `buf`.
pub fn scan_for_cids(buf: &[u8]) -> Vec<Cid> {
    CidScanner::new(buf).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{cid_v0_for, cid_v1_for};
    use cid::multibase::Base;

    mod find_next {
        use super::*;

        #[test]
        fn test_empty_buffer() {
            assert!(find_next_cid(b"").is_none());
        }

        #[test]
        fn test_plain_text_has_no_match() {
            assert!(find_next_cid(b"hello world, nothing to see here").is_none());
        }

        #[test]
        fn test_offsets_of_single_match() {
            let cid = cid_v0_for(b"alpha");
            let text = format!("--{}--", cid);
            let m = find_next_cid(text.as_bytes()).unwrap();
            assert_eq!(m.start, 2);
            assert_eq!(m.end, 2 + cid.to_string().len());
            assert_eq!(m.cid, cid);
        }

        #[test]
        fn test_skips_invalid_candidate_before_match() {
            let cid = cid_v1_for(b"beta");
            let text = format!("QmNotReallyACid {}", cid);
            let m = find_next_cid(text.as_bytes()).unwrap();
            assert_eq!(m.cid, cid);
            assert_eq!(m.start, 16);
        }

        #[test]
        fn test_overlong_run_is_ignored() {
            let cid = cid_v1_for(b"gamma");
            let text = format!("{}{}", "a".repeat(MAX_CID_TEXT_LEN), cid);
            assert!(find_next_cid(text.as_bytes()).is_none());
        }

        #[test]
        fn test_non_utf8_filler() {
            let cid = cid_v0_for(b"delta");
            let mut buf = vec![0xff, 0xfe, 0x00];
            buf.extend_from_slice(cid.to_string().as_bytes());
            buf.push(0x80);
            let m = find_next_cid(&buf).unwrap();
            assert_eq!(m.start, 3);
            assert_eq!(m.cid, cid);
        }
    }

    mod scanner {
        use super::*;

        #[test]
        fn test_no_identifiers_yields_empty() {
            assert!(scan_for_cids(b"{\"pins\": []}\n").is_empty());
            assert!(scan_for_cids(&[0u8; 64]).is_empty());
        }

        #[test]
        fn test_returns_all_in_order() {
            let cids = vec![
                cid_v0_for(b"one"),
                cid_v1_for(b"two"),
                cid_v0_for(b"three"),
                cid_v1_for(b"four"),
            ];
            let text = format!(
                "[\"{}\",\n \"{}\" ; {}|{}]",
                cids[0], cids[1], cids[2], cids[3]
            );
            assert_eq!(scan_for_cids(text.as_bytes()), cids);
        }

        #[test]
        fn test_duplicates_are_kept() {
            let cid = cid_v1_for(b"dup");
            let text = format!("{0},{0}", cid);
            assert_eq!(scan_for_cids(text.as_bytes()), vec![cid, cid]);
        }

        #[test]
        fn test_match_at_buffer_end() {
            let cid = cid_v0_for(b"tail");
            let text = format!("x {}", cid);
            assert_eq!(scan_for_cids(text.as_bytes()), vec![cid]);
        }

        #[test]
        fn test_base58_v1_is_canonicalized() {
            let cid = cid_v1_for(b"canonical");
            let text = cid.to_string_of_base(Base::Base58Btc).unwrap();
            let found = scan_for_cids(text.as_bytes());
            assert_eq!(found, vec![cid]);
            assert!(found[0].to_string().starts_with('b'));
        }

        #[test]
        fn test_cursor_advances_and_fuses() {
            let cid = cid_v1_for(b"cursor");
            let text = format!("{} trailing junk", cid);
            let mut scanner = CidScanner::new(text.as_bytes());
            assert_eq!(scanner.next(), Some(cid));
            assert_eq!(scanner.cursor(), cid.to_string().len());
            assert_eq!(scanner.next(), None);
            assert_eq!(scanner.cursor(), text.len());
            assert_eq!(scanner.next(), None);
        }

        #[test]
        fn test_restart_and_clone() {
            let a = cid_v0_for(b"a");
            let b = cid_v1_for(b"b");
            let text = format!("{} {}", a, b);
            let mut scanner = CidScanner::new(text.as_bytes());
            assert_eq!(scanner.next(), Some(a));

            let fork = scanner.clone();
            assert_eq!(fork.collect::<Vec<_>>(), vec![b]);

            scanner.restart();
            assert_eq!(scanner.collect::<Vec<_>>(), vec![a, b]);
        }
    }
}
