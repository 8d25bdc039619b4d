//! SDO upload state machine

use canhost_common::{sdo, traits::AsyncCanSender, CanFrame};
use snafu::ensure;

use crate::dispatch::FrameFilter;
use crate::error::{Result, ToggleMismatchSnafu};
use crate::sdo_client::SdoClient;

/// Per-transfer upload state
///
/// Created for a single call and never reused.
pub(crate) struct SdoReader<'a, S> {
    client: &'a SdoClient<S>,
    index: u16,
    sub_index: u8,
    toggle: u8,
    pos: usize,
    declared_size: Option<u32>,
    data: Vec<u8>,
}

impl<'a, S: AsyncCanSender> SdoReader<'a, S> {
    pub(crate) fn new(client: &'a SdoClient<S>, index: u16, sub_index: u8) -> Self {
        Self {
            client,
            index,
            sub_index,
            toggle: 0,
            pos: 0,
            declared_size: None,
            data: Vec::new(),
        }
    }

    fn build_upload_request(&self) -> [u8; 8] {
        let mut buf = [0u8; 8];
        buf[0] = sdo::REQUEST_UPLOAD;
        buf[1..3].copy_from_slice(&self.index.to_le_bytes());
        buf[3] = self.sub_index;
        buf
    }

    fn build_segment_request(&self) -> [u8; 8] {
        let mut buf = [0u8; 8];
        buf[0] = sdo::REQUEST_SEGMENT_UPLOAD | self.toggle;
        buf
    }

    /// Initiate the upload
    ///
    /// Returns the payload directly for expedited transfers, `None` when the
    /// peer chose the segmented protocol.
    async fn request_upload(&mut self) -> Result<Option<Vec<u8>>> {
        let index = self.index;
        let sub_index = self.sub_index;
        let expect: FrameFilter = Box::new(move |frame| {
            let data = frame.data();
            (data[0] & sdo::COMMAND_MASK) == sdo::RESPONSE_UPLOAD
                && u16::from_le_bytes([data[1], data[2]]) == index
                && data[3] == sub_index
        });

        let frame = self
            .client
            .exchange(&self.build_upload_request(), expect)
            .await?;
        let data = frame.data();
        let command = data[0];

        if command & sdo::EXPEDITED != 0 {
            let length = if command & sdo::SIZE_SPECIFIED != 0 {
                let unused = ((command >> 2) & 0x3) as usize;
                self.declared_size = Some((4 - unused) as u32);
                4 - unused
            } else {
                4
            };
            return Ok(Some(data[4..4 + length].to_vec()));
        }

        if command & sdo::SIZE_SPECIFIED != 0 {
            self.declared_size = Some(u32::from_le_bytes([data[4], data[5], data[6], data[7]]));
        }

        Ok(None)
    }

    async fn read_segment(&self) -> Result<CanFrame> {
        let expect: FrameFilter = Box::new(|frame| {
            (frame.data()[0] & sdo::COMMAND_MASK) == sdo::RESPONSE_SEGMENT_UPLOAD
        });
        self.client
            .exchange(&self.build_segment_request(), expect)
            .await
    }

    /// Run the whole upload and return the payload bytes
    pub(crate) async fn read_all(mut self) -> Result<Vec<u8>> {
        if let Some(expedited) = self.request_upload().await? {
            return Ok(expedited);
        }

        loop {
            let frame = self.read_segment().await?;
            let data = frame.data();
            let command = data[0];

            ensure!((command & sdo::TOGGLE_BIT) == self.toggle, ToggleMismatchSnafu);

            let length = 7 - ((command >> 1) & 0x7) as usize;
            self.data.extend_from_slice(&data[1..1 + length]);
            self.pos += length;
            self.toggle ^= sdo::TOGGLE_BIT;

            if command & sdo::NO_MORE_DATA != 0 {
                break;
            }
        }

        // Entries with a reported capacity can legitimately deliver fewer
        // bytes than declared, so a mismatch is left to higher layers.
        if let Some(declared) = self.declared_size {
            if declared as usize != self.pos {
                log::debug!(
                    "segmented upload of {:#06x}:{} delivered {} bytes, peer declared {declared}",
                    self.index,
                    self.sub_index,
                    self.pos
                );
            }
        }

        Ok(self.data)
    }
}
