//! In-memory I2C bus for driver tests.

use std::collections::VecDeque;

use async_trait::async_trait;

use super::{HwError, I2c, I2cError, Result};

/// One transfer as seen on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusOp {
    Write(u8, Vec<u8>),
    Read(u8, usize),
    WriteRead(u8, Vec<u8>, usize),
}

/// Records every transfer and answers reads from a queue of canned replies.
#[derive(Debug, Default)]
pub struct ScriptedI2c {
    ops: Vec<BusOp>,
    replies: VecDeque<Vec<u8>>,
    nack_after: Option<usize>,
}

impl ScriptedI2c {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_read(&mut self, bytes: &[u8]) {
        self.replies.push_back(bytes.to_vec());
    }

    /// Make every transfer after the first `count` fail with a NACK.
    pub fn nack_after(&mut self, count: usize) {
        self.nack_after = Some(count);
    }

    pub fn ops(&self) -> &[BusOp] {
        &self.ops
    }

    fn record(&mut self, op: BusOp) -> Result<()> {
        let addr = match &op {
            BusOp::Write(addr, _) | BusOp::Read(addr, _) | BusOp::WriteRead(addr, _, _) => *addr,
        };
        if self.nack_after.is_some_and(|limit| self.ops.len() >= limit) {
            return Err(HwError::I2c(I2cError::NoAck(addr)));
        }
        self.ops.push(op);
        Ok(())
    }

    fn fill(&mut self, buffer: &mut [u8]) {
        let reply = self.replies.pop_front().unwrap_or_default();
        for (dst, src) in buffer.iter_mut().zip(reply) {
            *dst = src;
        }
    }
}

#[async_trait]
impl I2c for ScriptedI2c {
    async fn write(&mut self, addr: u8, data: &[u8]) -> Result<()> {
        self.record(BusOp::Write(addr, data.to_vec()))
    }

    async fn read(&mut self, addr: u8, buffer: &mut [u8]) -> Result<()> {
        self.record(BusOp::Read(addr, buffer.len()))?;
        self.fill(buffer);
        Ok(())
    }

    async fn write_read(&mut self, addr: u8, write: &[u8], read: &mut [u8]) -> Result<()> {
        self.record(BusOp::WriteRead(addr, write.to_vec(), read.len()))?;
        self.fill(read);
        Ok(())
    }
}
