//! Line splitting shared by the text-based import formats. Lines are
//! delimited by LF, CR, or CR+LF; the iterator never yields the delimiter
//! bytes themselves.

pub struct Lines<'a> {
    remaining: &'a [u8],
}

pub fn split_lines(buf: &[u8]) -> Lines<'_> {
    Lines { remaining: buf }
}

impl<'a> Iterator for Lines<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining.is_empty() {
            return None;
        }
        let end = self
            .remaining
            .iter()
            .position(|&b| b == b'\n' || b == b'\r')
            .unwrap_or(self.remaining.len());
        let line = &self.remaining[..end];
        let mut rest = &self.remaining[end..];
        // swallow a CRLF or LFCR pair, and any run of blank terminators
        while let Some(&b) = rest.first() {
            if b == b'\n' || b == b'\r' {
                rest = &rest[1..];
            } else {
                break;
            }
        }
        self.remaining = rest;
        Some(line)
    }
}
