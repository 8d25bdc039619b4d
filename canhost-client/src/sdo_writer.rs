//! SDO download state machine

use canhost_common::{sdo, traits::AsyncCanSender, CanFrame};
use snafu::ensure;

use crate::dispatch::FrameFilter;
use crate::error::{Result, ToggleMismatchSnafu};
use crate::sdo_client::SdoClient;

/// Per-transfer download state
pub(crate) struct SdoWriter<'a, S> {
    client: &'a SdoClient<S>,
    index: u16,
    sub_index: u8,
    force_segment: bool,
    toggle: u8,
}

impl<'a, S: AsyncCanSender> SdoWriter<'a, S> {
    pub(crate) fn new(
        client: &'a SdoClient<S>,
        index: u16,
        sub_index: u8,
        force_segment: bool,
    ) -> Self {
        Self {
            client,
            index,
            sub_index,
            force_segment,
            toggle: 0,
        }
    }

    async fn initiate(&self, command: u8, payload: [u8; 4]) -> Result<CanFrame> {
        let mut req = [0u8; 8];
        req[0] = command;
        req[1..3].copy_from_slice(&self.index.to_le_bytes());
        req[3] = self.sub_index;
        req[4..8].copy_from_slice(&payload);

        let index = self.index;
        let sub_index = self.sub_index;
        let expect: FrameFilter = Box::new(move |frame| {
            let data = frame.data();
            (data[0] & sdo::COMMAND_MASK) == sdo::RESPONSE_DOWNLOAD
                && u16::from_le_bytes([data[1], data[2]]) == index
                && data[3] == sub_index
        });
        self.client.exchange(&req, expect).await
    }

    async fn write_segment(&mut self, chunk: &[u8], last: bool) -> Result<()> {
        let mut req = [0u8; 8];
        let unused = (7 - chunk.len()) as u8;
        req[0] = sdo::REQUEST_SEGMENT_DOWNLOAD
            | self.toggle
            | (unused << 1)
            | if last { sdo::NO_MORE_DATA } else { 0 };
        req[1..1 + chunk.len()].copy_from_slice(chunk);

        let expect: FrameFilter = Box::new(|frame| {
            (frame.data()[0] & sdo::COMMAND_MASK) == sdo::RESPONSE_SEGMENT_DOWNLOAD
        });
        let frame = self.client.exchange(&req, expect).await?;

        ensure!(
            (frame.data()[0] & sdo::TOGGLE_BIT) == self.toggle,
            ToggleMismatchSnafu
        );
        self.toggle ^= sdo::TOGGLE_BIT;
        Ok(())
    }

    /// Run the whole download
    pub(crate) async fn write_all(mut self, data: &[u8]) -> Result<()> {
        if data.len() <= 4 && !self.force_segment {
            let unused = (4 - data.len()) as u8;
            let command =
                sdo::REQUEST_DOWNLOAD | (unused << 2) | sdo::EXPEDITED | sdo::SIZE_SPECIFIED;
            let mut payload = [0u8; 4];
            payload[..data.len()].copy_from_slice(data);
            self.initiate(command, payload).await?;
            return Ok(());
        }

        let command = sdo::REQUEST_DOWNLOAD | sdo::SIZE_SPECIFIED;
        self.initiate(command, (data.len() as u32).to_le_bytes())
            .await?;

        if data.is_empty() {
            // A forced segmented transfer of nothing still needs its final
            // (empty) segment to close the exchange.
            return self.write_segment(&[], true).await;
        }

        let total = data.len().div_ceil(7);
        for (n, chunk) in data.chunks(7).enumerate() {
            self.write_segment(chunk, n == total - 1).await?;
        }
        Ok(())
    }
}
