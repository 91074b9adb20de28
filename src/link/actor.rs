//! The link actor and the public transport handles.
//!
//! Two tasks carry the whole connection. A reader task turns raw UART
//! bytes into frames; the link actor owns every piece of mutable
//! protocol state (counters, unacked queue, timers, the write half) and
//! multiplexes completed frames, the outbound HCI queue, and the three
//! deadlines in one `select!` loop. Nothing else ever touches link
//! state, which is what makes the lock-free single-writer model sound.

use std::sync::{
   Arc,
   atomic::{AtomicBool, Ordering},
};

use log::{debug, info, warn};
use tokio::{
   io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
   select,
   sync::mpsc::{self, error::TrySendError},
   task::JoinSet,
   time::{self, Instant},
};

use crate::{
   config::H5Config,
   error::{H5Error, Result},
   link::{LinkPhase, arq::ArqEngine, rx::RxReassembler},
   proto::{
      frame::{self, Frame, Packet, PacketType},
      header::{FrameHeader, MAX_PAYLOAD},
      slip,
   },
};

/// Depth of the reader-to-actor frame channel.
const FRAME_CHANNEL_DEPTH: usize = 32;

/// Depth of the upward delivery channel.
const DELIVERY_CHANNEL_DEPTH: usize = 32;

/// Consecutive out-of-sequence reliable frames tolerated on an active
/// link before the handshake is renegotiated from scratch. Ordinary
/// go-back-N loss produces short bursts of mismatches that clear as
/// soon as the peer retransmits; a burst this long means the two sides
/// disagree about history.
const RESYNC_AFTER: u8 = 16;

struct TxRequest {
   packet_type: PacketType,
   payload: Packet,
}

/// Sending half of an H5 link.
///
/// Dropping the transport aborts both worker tasks and releases the
/// UART halves.
pub struct H5Transport {
   cmd_tx: mpsc::Sender<TxRequest>,
   active: Arc<AtomicBool>,
   _tasks: JoinSet<()>,
}

/// Receiving half of an H5 link: HCI packets the peer delivered in
/// sequence order.
pub struct H5Receiver {
   rx: mpsc::Receiver<(PacketType, Packet)>,
}

impl H5Receiver {
   pub async fn recv(&mut self) -> Result<(PacketType, Packet)> {
      self.rx.recv().await.ok_or(H5Error::LinkClosed)
   }
}

impl H5Transport {
   /// Attaches a transport to the UART halves and starts the SYNC
   /// handshake. HCI traffic flows once [`is_active`](Self::is_active)
   /// reports true.
   pub fn attach<R, W>(reader: R, writer: W, config: H5Config) -> (Self, H5Receiver)
   where
      R: AsyncRead + Unpin + Send + 'static,
      W: AsyncWrite + Unpin + Send + 'static,
   {
      let (cmd_tx, cmd_rx) = mpsc::channel(config.tx_queue_depth);
      let (frame_tx, frame_rx) = mpsc::channel(FRAME_CHANNEL_DEPTH);
      let (deliver_tx, deliver_rx) = mpsc::channel(DELIVERY_CHANNEL_DEPTH);
      let active = Arc::new(AtomicBool::new(false));

      let mut tasks = JoinSet::new();
      tasks.spawn(read_task(reader, RxReassembler::new(&config), frame_tx));

      let actor = LinkActor {
         arq: ArqEngine::new(config.window()),
         config,
         writer,
         cmd_rx,
         frame_rx,
         deliver_tx,
         active: active.clone(),
         retransmit_at: None,
         ack_at: None,
         handshake_at: None,
         seq_mismatches: 0,
      };
      tasks.spawn(actor.run());

      (
         Self {
            cmd_tx,
            active,
            _tasks: tasks,
         },
         H5Receiver { rx: deliver_rx },
      )
   }

   /// Whether the SYNC/CONFIG handshake has completed.
   pub fn is_active(&self) -> bool {
      self.active.load(Ordering::Relaxed)
   }

   /// Queues an HCI packet for transmission.
   ///
   /// Reliable types (Command, ACL, Event) are retransmitted until the
   /// controller acknowledges them; SCO and vendor packets are sent
   /// once. Pure acks and link-control signals belong to the transport
   /// and are rejected here.
   pub fn send(&self, packet_type: PacketType, payload: &[u8]) -> Result<()> {
      if !packet_type.is_hci() {
         return Err(H5Error::Unsendable(packet_type));
      }
      if payload.len() > MAX_PAYLOAD {
         return Err(H5Error::PayloadTooLong(payload.len()));
      }
      if !self.is_active() {
         return Err(H5Error::NotReady);
      }

      self
         .cmd_tx
         .try_send(TxRequest {
            packet_type,
            payload: Packet::from_slice(payload),
         })
         .map_err(|e| match e {
            TrySendError::Full(_) => H5Error::QueueFull,
            TrySendError::Closed(_) => H5Error::LinkClosed,
         })
   }
}

/// Feeds UART bytes through the reassembler, one at a time, and hands
/// completed frames to the actor.
async fn read_task<R: AsyncRead + Unpin>(
   mut reader: R,
   mut reassembler: RxReassembler,
   frame_tx: mpsc::Sender<Frame>,
) {
   let mut buf = [0u8; 256];
   loop {
      let n = match reader.read(&mut buf).await {
         Ok(0) => {
            info!("UART read side closed");
            return;
         },
         Ok(n) => n,
         Err(e) => {
            warn!("UART read error: {e}");
            return;
         },
      };
      for &byte in &buf[..n] {
         if let Some(frame) = reassembler.feed(byte)
            && frame_tx.send(frame).await.is_err()
         {
            return;
         }
      }
   }
}

struct LinkActor<W> {
   config: H5Config,
   writer: W,
   arq: ArqEngine,
   cmd_rx: mpsc::Receiver<TxRequest>,
   frame_rx: mpsc::Receiver<Frame>,
   deliver_tx: mpsc::Sender<(PacketType, Packet)>,
   active: Arc<AtomicBool>,
   retransmit_at: Option<Instant>,
   ack_at: Option<Instant>,
   handshake_at: Option<Instant>,
   seq_mismatches: u8,
}

fn deadline(at: Option<Instant>) -> Instant {
   // Placeholder for disabled select branches, never polled
   at.unwrap_or_else(Instant::now)
}

impl<W: AsyncWrite + Unpin> LinkActor<W> {
   async fn run(mut self) {
      if let Err(e) = self.drive().await {
         warn!("Link actor stopped: {e}");
      }
      self.active.store(false, Ordering::Relaxed);
   }

   async fn drive(&mut self) -> Result<()> {
      info!("Starting H5 handshake");
      self.send_signal(frame::SYNC).await?;
      self.handshake_at = Some(Instant::now() + self.config.sync_retry());

      loop {
         let tx_ready =
            self.arq.link.phase == LinkPhase::Active && self.arq.window_open();
         let retransmit_at = self.retransmit_at;
         let ack_at = self.ack_at;
         let handshake_at = self.handshake_at;

         select! {
            maybe_frame = self.frame_rx.recv() => match maybe_frame {
               Some(frame) => self.on_frame(frame).await?,
               None => {
                  debug!("Reader task ended, shutting down link");
                  return Ok(());
               },
            },
            maybe_req = self.cmd_rx.recv(), if tx_ready => match maybe_req {
               Some(req) => self.send_hci(req).await?,
               None => {
                  debug!("Transport handle dropped, shutting down link");
                  return Ok(());
               },
            },
            _ = time::sleep_until(deadline(retransmit_at)), if retransmit_at.is_some() => {
               self.retransmit().await?;
            },
            _ = time::sleep_until(deadline(ack_at)), if ack_at.is_some() => {
               self.send_pure_ack().await?;
            },
            _ = time::sleep_until(deadline(handshake_at)), if handshake_at.is_some() => {
               self.retry_handshake().await?;
            },
         }
      }
   }

   async fn on_frame(&mut self, frame: Frame) -> Result<()> {
      // Every frame carries a valid cumulative ack
      self.arq.record_ack(frame.header.ack);
      if !self.arq.has_unacked() {
         self.retransmit_at = None;
      }

      match frame.header.packet_type {
         PacketType::LinkControl => self.on_signal(&frame.payload).await,
         // Pure ack, bookkeeping already done above
         PacketType::Ack => Ok(()),
         _ => self.on_data(frame).await,
      }
   }

   async fn on_data(&mut self, frame: Frame) -> Result<()> {
      if self.arq.link.phase != LinkPhase::Active {
         warn!(
            "Dropping {} frame received while link is {:?}",
            frame.header.packet_type, self.arq.link.phase
         );
         return Ok(());
      }

      if frame.header.reliable {
         if !self.arq.accept_reliable(frame.header.seq) {
            // Duplicate or gap: drop the frame and re-advertise our
            // tx_ack so a peer that lost an ack can move on.
            if self.ack_at.is_none() {
               self.ack_at = Some(Instant::now() + self.config.ack_delay());
            }
            self.seq_mismatches += 1;
            if self.seq_mismatches >= RESYNC_AFTER {
               return self.resync().await;
            }
            return Ok(());
         }
         self.seq_mismatches = 0;
         if self.ack_at.is_none() {
            self.ack_at = Some(Instant::now() + self.config.ack_delay());
         }
      }

      if self
         .deliver_tx
         .send((frame.header.packet_type, frame.payload))
         .await
         .is_err()
      {
         return Err(H5Error::LinkClosed);
      }
      Ok(())
   }

   async fn on_signal(&mut self, payload: &[u8]) -> Result<()> {
      if payload.starts_with(frame::SYNC) {
         debug!("SYNC from peer");
         self.send_signal(frame::SYNC_RESP).await?;
      } else if payload.starts_with(frame::SYNC_RESP) {
         if matches!(self.arq.link.phase, LinkPhase::Uninit | LinkPhase::Init) {
            self.arq.link.phase = LinkPhase::Init;
            info!("Peer answered SYNC, negotiating configuration");
            self.send_config_req().await?;
         }
      } else if payload.starts_with(frame::CONFIG_REQ) {
         debug!("CONFIG_REQ from peer: {}", hex::encode(payload));
         self
            .send_signal(&[frame::CONFIG_RESP[0], frame::CONFIG_RESP[1], self.config.window()])
            .await?;
         // Keep our own request in flight until the exchange finishes;
         // once active, answering again would ping-pong forever.
         if self.arq.link.phase != LinkPhase::Active {
            self.send_config_req().await?;
         }
      } else if payload.starts_with(frame::CONFIG_RESP) {
         if let Some(&cfg) = payload.get(2) {
            let window = cfg & 0x07;
            if window != 0 {
               self.arq.link.tx_win = window;
            }
         }
         if self.arq.link.phase != LinkPhase::Active {
            self.arq.link.phase = LinkPhase::Active;
            self.handshake_at = None;
            self.active.store(true, Ordering::Relaxed);
            info!("Link active, tx window {}", self.arq.link.tx_win);
         }
      } else if payload.starts_with(frame::WAKEUP)
         || payload.starts_with(frame::WOKEN)
         || payload.starts_with(frame::SLEEP)
      {
         debug!("Ignoring low-energy signal: {}", hex::encode(payload));
      } else {
         warn!("Unknown link-control payload: {}", hex::encode(payload));
      }
      Ok(())
   }

   async fn send_hci(&mut self, req: TxRequest) -> Result<()> {
      let reliable = req.packet_type.is_reliable();
      let mut header = FrameHeader {
         seq: 0,
         ack: self.arq.link.tx_ack,
         crc_present: false,
         reliable,
         packet_type: req.packet_type,
         len: req.payload.len() as u16,
      };

      if reliable {
         header.seq = self.arq.register_send(req.packet_type, req.payload.clone());
         self.retransmit_at = Some(Instant::now() + self.config.retransmit_timeout());
      }

      self.write_frame(&header, &req.payload).await
   }

   /// Re-sends the whole unacked queue in original order, ahead of any
   /// queued HCI traffic. Sequence numbers are the originally assigned
   /// ones; `tx_seq` does not move.
   async fn retransmit(&mut self) -> Result<()> {
      warn!(
         "Retransmission timeout, {} frame(s) in flight",
         self.arq.unacked_len()
      );

      let pending: Vec<(PacketType, u8, Packet)> = self
         .arq
         .unacked()
         .map(|f| (f.packet_type, f.seq, f.payload.clone()))
         .collect();
      for (packet_type, seq, payload) in pending {
         let header = FrameHeader {
            seq,
            ack: self.arq.link.tx_ack,
            crc_present: false,
            reliable: true,
            packet_type,
            len: payload.len() as u16,
         };
         self.write_frame(&header, &payload).await?;
      }

      self.retransmit_at = self
         .arq
         .has_unacked()
         .then(|| Instant::now() + self.config.retransmit_timeout());
      Ok(())
   }

   /// Zero-length unreliable frame carrying the current `tx_ack`.
   async fn send_pure_ack(&mut self) -> Result<()> {
      let header = FrameHeader {
         seq: 0,
         ack: self.arq.link.tx_ack,
         crc_present: false,
         reliable: false,
         packet_type: PacketType::Ack,
         len: 0,
      };
      self.write_frame(&header, &[]).await
   }

   async fn retry_handshake(&mut self) -> Result<()> {
      match self.arq.link.phase {
         LinkPhase::Uninit => {
            debug!("Re-sending SYNC");
            self.send_signal(frame::SYNC).await?;
         },
         LinkPhase::Init => {
            debug!("Re-sending CONFIG_REQ");
            self.send_config_req().await?;
         },
         LinkPhase::Active => {},
      }
      self.handshake_at = (self.arq.link.phase != LinkPhase::Active)
         .then(|| Instant::now() + self.config.sync_retry());
      Ok(())
   }

   /// Tears the link back down to `Uninit` and renegotiates. This is
   /// deliberate new behavior for persistent sequence disagreement; the
   /// vendor drivers leave the condition unresolved.
   async fn resync(&mut self) -> Result<()> {
      warn!("Persistent sequence mismatch, renegotiating link");
      self.active.store(false, Ordering::Relaxed);
      self.arq.reset(self.config.window());
      self.retransmit_at = None;
      self.ack_at = None;
      self.seq_mismatches = 0;

      self.send_signal(frame::SYNC).await?;
      self.handshake_at = Some(Instant::now() + self.config.sync_retry());
      Ok(())
   }

   async fn send_config_req(&mut self) -> Result<()> {
      self
         .send_signal(&[frame::CONFIG_REQ[0], frame::CONFIG_REQ[1], self.config.window()])
         .await
   }

   /// Link-control frames are unreliable and bypass the HCI queue and
   /// the ARQ window entirely.
   async fn send_signal(&mut self, payload: &[u8]) -> Result<()> {
      let header = FrameHeader {
         seq: 0,
         ack: self.arq.link.tx_ack,
         crc_present: false,
         reliable: false,
         packet_type: PacketType::LinkControl,
         len: payload.len() as u16,
      };
      self.write_frame(&header, payload).await
   }

   async fn write_frame(&mut self, header: &FrameHeader, payload: &[u8]) -> Result<()> {
      // Every outgoing frame carries tx_ack, so any pending deferred
      // ack piggy-backs on this one.
      self.ack_at = None;

      let mut wire = Vec::with_capacity(payload.len() * 2 + 12);
      wire.push(slip::DELIMITER);
      slip::stuff_all(&header.encode(), &mut wire);
      slip::stuff_all(payload, &mut wire);
      wire.push(slip::DELIMITER);

      debug!(
         "→ {} seq {} ack {} len {}: {}",
         header.packet_type,
         header.seq,
         header.ack,
         header.len,
         hex::encode(&wire)
      );

      self.writer.write_all(&wire).await?;
      self.writer.flush().await?;
      Ok(())
   }
}
