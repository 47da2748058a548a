use std::io;

/// Size of one fragment page in bytes.
pub const FRAGMENT_SIZE: usize = 4096;

/// One fixed-size byte page of a segment body.
#[derive(Debug)]
pub struct Fragment {
    data: Vec<u8>,
}

impl Fragment {
    fn new() -> Self {
        Self {
            data: Vec::with_capacity(FRAGMENT_SIZE),
        }
    }

    /// Bytes used so far.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the page holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The used portion of the page.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    fn remaining(&self) -> usize {
        FRAGMENT_SIZE - self.data.len()
    }
}

/// Append-only chain of fixed-size pages forming a segment body.
///
/// Writes copy into the tail page; a fresh page is linked each time the tail
/// fills. No single allocation exceeds [`FRAGMENT_SIZE`], so a long segment
/// never needs one large contiguous buffer while it grows.
#[derive(Debug, Default)]
pub struct FragmentChain {
    fragments: Vec<Fragment>,
    size: usize,
}

impl FragmentChain {
    /// Creates an empty chain; the first page is allocated on first write.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total bytes written into the chain.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Whether nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Number of pages in the chain.
    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    /// Iterates the used portion of every page in order.
    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.fragments.iter().map(Fragment::as_slice)
    }

    fn append(&mut self, mut bytes: &[u8]) {
        self.size += bytes.len();
        while !bytes.is_empty() {
            let tail_remaining = self.fragments.last().map(Fragment::remaining).unwrap_or(0);
            if tail_remaining == 0 {
                self.fragments.push(Fragment::new());
                continue;
            }
            let take = bytes.len().min(tail_remaining);
            let tail = self
                .fragments
                .last_mut()
                .expect("tail fragment exists after remaining check");
            tail.data.extend_from_slice(&bytes[..take]);
            bytes = &bytes[take..];
        }
    }
}

impl io::Write for FragmentChain {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.append(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
