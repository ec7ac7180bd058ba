//! Streaming content digest used as the object ETag.
//!
//! MD5 is an integrity tag here, not a security primitive.

use md5::Context;

/// Incremental MD5 accumulator.
///
/// Feed chunks with [`update`](Self::update) and produce the lowercase hex
/// tag with [`finalize`](Self::finalize). One instance covers one read or
/// write pass.
pub struct DigestComputer {
    ctx: Context,
}

impl DigestComputer {
    pub fn new() -> Self {
        Self {
            ctx: Context::new(),
        }
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.ctx.consume(chunk);
    }

    /// Discard everything consumed so far.
    pub fn reset(&mut self) {
        self.ctx = Context::new();
    }

    pub fn finalize(self) -> String {
        format!("{:x}", self.ctx.compute())
    }
}

#[cfg(test)]
impl DigestComputer {
    /// Digest of an in-memory buffer.
    pub(crate) fn hex_digest(data: &[u8]) -> String {
        format!("{:x}", md5::compute(data))
    }
}

impl Default for DigestComputer {
    fn default() -> Self {
        Self::new()
    }
}
