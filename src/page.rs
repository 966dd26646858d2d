//! Fixed-size page buffers.

/// Size in bytes of a single disk page. Matches Postgres's default `BLCKSZ`.
pub const BLCKSZ: usize = 8192;

/// A fixed-size page image.
///
/// Every offset the rest of the crate deals with — `dstOffset`, `srcOffset`,
/// `Memmove` arguments — lives in `[0, BLCKSZ)`; every length lives in
/// `[0, BLCKSZ]`.
#[derive(Clone)]
pub struct PageBuf(pub Box<[u8; BLCKSZ]>);

impl PageBuf {
    pub fn zeroed() -> Self {
        Self(Box::new([0u8; BLCKSZ]))
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut buf = Self::zeroed();
        buf.0.copy_from_slice(bytes);
        buf
    }
}

impl AsRef<[u8]> for PageBuf {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl AsMut<[u8]> for PageBuf {
    fn as_mut(&mut self) -> &mut [u8] {
        self.0.as_mut()
    }
}

impl std::ops::Deref for PageBuf {
    type Target = [u8; BLCKSZ];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::ops::DerefMut for PageBuf {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}
