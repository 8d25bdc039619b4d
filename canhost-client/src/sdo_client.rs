//! Generic retrying SDO request/response transport and typed accessors

use std::fmt;
use std::time::Duration;

use canhost_common::{constants::cob, sdo, traits::AsyncCanSender, CanFrame};
use snafu::ensure;

use crate::dispatch::FrameFilter;
use crate::error::{CancelledSnafu, ProtocolSnafu, Result, TimeoutSnafu};
use crate::node::Node;
use crate::sdo_reader::SdoReader;
use crate::sdo_writer::SdoWriter;

/// A client for a node's default SDO server
///
/// The client derives its COB-IDs from the node id: requests go out on
/// `0x600 + id`, responses are expected on `0x580 + id`. No state persists
/// between transactions, so a client can be created per call.
pub struct SdoClient<S> {
    node: Node<S>,
    rx_cob_id: u32,
    tx_cob_id: u32,
}

impl<S: AsyncCanSender> SdoClient<S> {
    /// Create a client for `node`'s default SDO server
    pub fn new(node: Node<S>) -> Self {
        let id = node.id().raw() as u32;
        Self {
            node,
            rx_cob_id: cob::SDO_REQUEST + id,
            tx_cob_id: cob::SDO_RESPONSE + id,
        }
    }

    /// COB-ID requests are transmitted on (received by the node)
    pub fn rx_cob_id(&self) -> u32 {
        self.rx_cob_id
    }

    /// COB-ID responses arrive on (transmitted by the node)
    pub fn tx_cob_id(&self) -> u32 {
        self.tx_cob_id
    }

    /// Fire-and-forget transmission of a raw SDO request
    pub async fn send_request(&self, req: &[u8]) -> Result<()> {
        self.node.send(self.rx_cob_id, req).await
    }

    /// Send a request and optionally wait for a matching response
    ///
    /// Without `expect` this is a plain transmission and returns `Ok(None)`.
    /// With `expect`, a subscriber filtered on this client's response COB-ID
    /// and the caller's predicate is registered *before* the first
    /// transmission, so a response cannot slip past the waiter. Each attempt
    /// waits for the current timeout, which starts at 500 ms (or `timeout`)
    /// and doubles after every miss; the request is retransmitted up to four
    /// (or `retries`) times in total before
    /// [`Timeout`](crate::ClientError::Timeout) is returned.
    ///
    /// The subscriber is released on every exit path. If it is released from
    /// elsewhere while the response is awaited, the call fails with
    /// [`Cancelled`](crate::ClientError::Cancelled).
    pub async fn send(
        &self,
        req: &[u8],
        expect: Option<FrameFilter>,
        timeout: Option<Duration>,
        retries: Option<u32>,
    ) -> Result<Option<CanFrame>> {
        let Some(expect) = expect else {
            self.send_request(req).await?;
            return Ok(None);
        };

        let mut timeout = timeout.unwrap_or(sdo::DEFAULT_RESPONSE_TIMEOUT);
        let retries = retries.unwrap_or(sdo::DEFAULT_RETRY_COUNT);

        let tx_cob_id = self.tx_cob_id;
        let mut responses = self.node.subscribe(Box::new(move |frame| {
            frame.arbitration_id() == tx_cob_id && expect(frame)
        }))?;

        for attempt in 1..=retries {
            self.send_request(req).await?;
            tokio::select! {
                biased;
                received = responses.recv() => {
                    return match received {
                        Ok(frame) => Ok(Some(frame)),
                        Err(_) => CancelledSnafu.fail(),
                    };
                }
                _ = tokio::time::sleep(timeout) => {
                    log::debug!(
                        "no SDO response from {:#x} within {timeout:?} (attempt {attempt}/{retries})",
                        self.tx_cob_id
                    );
                    timeout *= 2;
                }
            }
        }

        TimeoutSnafu.fail()
    }

    /// Send a request and wait for its 8-byte response
    ///
    /// Internal entry point for the transfer engines: unwraps the frame and
    /// enforces the full SDO dlc.
    pub(crate) async fn exchange(&self, req: &[u8], expect: FrameFilter) -> Result<CanFrame> {
        let frame = self
            .send(req, Some(expect), None, None)
            .await?
            .ok_or(crate::ClientError::Protocol)?;
        ensure!(frame.dlc() == 8, ProtocolSnafu);
        Ok(frame)
    }

    /// Read a dictionary entry via SDO upload
    ///
    /// Handles both expedited and segmented transfers. The engine transmits
    /// no SDO abort frames when it gives up, and an abort sent by the peer is
    /// not recognized as a response, so a peer-side abort surfaces as
    /// [`Timeout`](crate::ClientError::Timeout).
    pub async fn read(&self, index: u16, sub_index: u8) -> Result<Vec<u8>> {
        SdoReader::new(self, index, sub_index).read_all().await
    }

    /// Write a dictionary entry via SDO download
    ///
    /// Payloads of up to four bytes use an expedited transfer unless
    /// `force_segment` is set. The same abort-frame caveat as
    /// [`read`](Self::read) applies.
    pub async fn write(
        &self,
        index: u16,
        sub_index: u8,
        force_segment: bool,
        data: &[u8],
    ) -> Result<()> {
        SdoWriter::new(self, index, sub_index, force_segment)
            .write_all(data)
            .await
    }

    /// Read a sub-object, expecting a u8
    pub async fn read_u8(&self, index: u16, sub_index: u8) -> Result<u8> {
        let data = self.read(index, sub_index).await?;
        ensure!(data.len() == 1, ProtocolSnafu);
        Ok(data[0])
    }

    /// Read a sub-object, expecting a u16
    pub async fn read_u16(&self, index: u16, sub_index: u8) -> Result<u16> {
        let data = self.read(index, sub_index).await?;
        ensure!(data.len() == 2, ProtocolSnafu);
        Ok(u16::from_le_bytes([data[0], data[1]]))
    }

    /// Read a sub-object, expecting a u32
    pub async fn read_u32(&self, index: u16, sub_index: u8) -> Result<u32> {
        let data = self.read(index, sub_index).await?;
        ensure!(data.len() == 4, ProtocolSnafu);
        Ok(u32::from_le_bytes([data[0], data[1], data[2], data[3]]))
    }

    /// Read a sub-object, expecting an i8
    pub async fn read_i8(&self, index: u16, sub_index: u8) -> Result<i8> {
        Ok(self.read_u8(index, sub_index).await? as i8)
    }

    /// Read a sub-object, expecting an i16
    pub async fn read_i16(&self, index: u16, sub_index: u8) -> Result<i16> {
        Ok(self.read_u16(index, sub_index).await? as i16)
    }

    /// Read a sub-object, expecting an i32
    pub async fn read_i32(&self, index: u16, sub_index: u8) -> Result<i32> {
        Ok(self.read_u32(index, sub_index).await? as i32)
    }

    /// Read a sub-object as a UTF-8 string
    pub async fn read_string(&self, index: u16, sub_index: u8) -> Result<String> {
        let data = self.read(index, sub_index).await?;
        Ok(String::from_utf8_lossy(&data).into_owned())
    }

    /// Write a u8 sub-object
    pub async fn write_u8(&self, index: u16, sub_index: u8, value: u8) -> Result<()> {
        self.write(index, sub_index, false, &value.to_le_bytes()).await
    }

    /// Write a u16 sub-object
    pub async fn write_u16(&self, index: u16, sub_index: u8, value: u16) -> Result<()> {
        self.write(index, sub_index, false, &value.to_le_bytes()).await
    }

    /// Write a u32 sub-object
    pub async fn write_u32(&self, index: u16, sub_index: u8, value: u32) -> Result<()> {
        self.write(index, sub_index, false, &value.to_le_bytes()).await
    }

    /// Write an i32 sub-object
    pub async fn write_i32(&self, index: u16, sub_index: u8, value: i32) -> Result<()> {
        self.write(index, sub_index, false, &value.to_le_bytes()).await
    }
}

impl<S> fmt::Debug for SdoClient<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SdoClient")
            .field("rx_cob_id", &self.rx_cob_id)
            .field("tx_cob_id", &self.tx_cob_id)
            .finish_non_exhaustive()
    }
}
