//! Async host loop on tokio.
//!
//! The core never sleeps. This module is the part that does: it asks the
//! manager for the next knock, waits for its start, runs it on a
//! [`Transceiver`] and reports the result back.
//!
//! ```text
//! loop {
//!     knock = mesh.knock(now)          none → sleep(idle)
//!     sleep_until(knock.start)
//!     tx: knocking → transmit → knocked
//!     rx: receive  → knocked           malformed frames are dropped
//!     process → delivered packets
//! }
//! ```

use std::io;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, trace, warn};

use crate::core::{EPOCH_WINDOW, RadioError, TmeshError, TmeshResult};
use crate::mesh::{Delivered, Tmesh};
use crate::radio::RadioId;
use crate::schedule::Knock;

/// Monotonic microsecond clock on a timebase shared with peers.
///
/// Rendezvous only line up when every device reads the same base, so hosts
/// anchor the clock with [`Clock::from_unix`] or an explicit offset from a
/// common reference.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    origin: Instant,
    /// Shared timestamp at `origin`.
    offset: u64,
}

impl Clock {
    /// Start a clock at zero on the current instant.
    pub fn new() -> Self {
        Self::with_offset(0)
    }

    /// Start a clock reading `offset` microseconds on the current instant.
    pub fn with_offset(offset: u64) -> Self {
        Self {
            origin: Instant::now(),
            offset,
        }
    }

    /// Start a clock on microseconds since the Unix epoch.
    ///
    /// A system clock set before 1970 reads as zero.
    pub fn from_unix() -> Self {
        let since = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self::with_offset(since.as_micros().min(u64::MAX as u128) as u64)
    }

    /// Microseconds on the shared timebase.
    pub fn now_us(&self) -> u64 {
        let elapsed = self.origin.elapsed().as_micros().min(u64::MAX as u128) as u64;
        self.offset.saturating_add(elapsed)
    }

    /// Instant of an absolute microsecond timestamp.
    ///
    /// Timestamps before the clock started map to its start.
    pub fn instant_at(&self, us: u64) -> Instant {
        self.origin + Duration::from_micros(us.saturating_sub(self.offset))
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

/// Radio hardware as seen by the host loop.
///
/// Called at a knock's start; both operations should return by the knock's
/// stop time.
#[allow(async_fn_in_trait)]
pub trait Transceiver {
    /// Transmit a frame on the knock's channel.
    async fn transmit(&mut self, knock: &Knock, frame: &[u8]) -> io::Result<()>;

    /// Listen on the knock's channel.
    ///
    /// Returns the number of bytes written into `buf`, or `None` if nothing
    /// was heard.
    async fn receive(&mut self, knock: &Knock, buf: &mut [u8]) -> io::Result<Option<usize>>;
}

/// Drives one radio of a [`Tmesh`].
#[derive(Debug)]
pub struct KnockLoop<T> {
    mesh: Tmesh,
    radio: RadioId,
    transceiver: T,
    clock: Clock,
    idle: Duration,
    /// The radio is busy until the last knock's stop.
    busy_until: u64,
}

impl<T: Transceiver> KnockLoop<T> {
    /// Create a loop for one registered radio.
    pub fn new(mesh: Tmesh, radio: RadioId, transceiver: T) -> TmeshResult<Self> {
        if !mesh.radios().contains(radio) {
            return Err(RadioError::UnknownDevice(radio).into());
        }
        Ok(Self {
            mesh,
            radio,
            transceiver,
            clock: Clock::new(),
            idle: Duration::from_micros(EPOCH_WINDOW),
            busy_until: 0,
        })
    }

    /// Set the sleep used when nothing is scheduled.
    pub fn with_idle(mut self, idle: Duration) -> Self {
        self.idle = idle;
        self
    }

    /// Use a specific clock.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// The manager.
    pub fn mesh(&self) -> &Tmesh {
        &self.mesh
    }

    /// The manager, mutably.
    pub fn mesh_mut(&mut self) -> &mut Tmesh {
        &mut self.mesh
    }

    /// The transceiver.
    pub fn transceiver(&self) -> &T {
        &self.transceiver
    }

    /// The clock.
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Run a single knock, returning packets completed by it.
    pub async fn run_once(&mut self) -> TmeshResult<Vec<Delivered>> {
        let now = self.clock.now_us().max(self.busy_until);
        let Some(knock) = self.mesh.knock(now, self.radio) else {
            trace!(radio = self.radio.0, idle = ?self.idle, "nothing scheduled");
            sleep(self.idle).await;
            return Ok(Vec::new());
        };

        sleep_until(self.clock.instant_at(knock.start())).await;
        self.busy_until = knock.stop();

        if knock.is_tx() {
            if let Some(frame) = self.mesh.knocking(&knock)? {
                self.transceiver.transmit(&knock, &frame).await?;
                self.mesh.knocked(&knock, &frame)?;
            }
        } else {
            let mut buf = vec![0u8; self.mesh.config().frame_size];
            match self.transceiver.receive(&knock, &mut buf).await? {
                Some(len) => {
                    let len = len.min(buf.len());
                    match self.mesh.knocked(&knock, &buf[..len]) {
                        Err(e) if e.is_drop() => debug!(error = %e, "frame dropped"),
                        other => other?,
                    }
                }
                None => trace!(chan = knock.chan(), "nothing heard"),
            }
        }

        self.mesh.process()
    }

    /// Run until a hard failure, handing every packet to `deliver`.
    ///
    /// Transceiver I/O errors and allocation failures stop the loop; anything
    /// else is logged and the next knock runs.
    pub async fn run<F>(&mut self, mut deliver: F) -> TmeshResult<()>
    where
        F: FnMut(Delivered),
    {
        loop {
            match self.run_once().await {
                Ok(packets) => packets.into_iter().for_each(&mut deliver),
                Err(e) if e.is_fatal() || matches!(e, TmeshError::Io(_)) => return Err(e),
                Err(e) => warn!(error = %e, "knock failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::LinkId;
    use crate::mesh::{JoinOptions, TmeshConfig};
    use crate::radio::{Medium, MediumId, MediumTiming, RadioDriver};
    use crate::schedule::{CommunityId, Direction, Epoch, EpochKind, MoteId};

    #[derive(Debug)]
    struct FakeRadio;

    impl RadioDriver for FakeRadio {
        fn energy(&self, _medium: &MediumId) -> u32 {
            1
        }

        fn acquire(&mut self, _medium: &MediumId) -> Result<MediumTiming, RadioError> {
            Ok(MediumTiming {
                min: 2_000,
                max: 8_000,
                chans: 2,
            })
        }

        fn release(&mut self, _medium: &Medium) {}
    }

    /// Records transmissions and plays back one inbound frame.
    #[derive(Debug, Default)]
    struct Loopback {
        sent: Vec<Vec<u8>>,
        inbound: Option<Vec<u8>>,
        fail: bool,
    }

    impl Transceiver for Loopback {
        async fn transmit(&mut self, _knock: &Knock, frame: &[u8]) -> io::Result<()> {
            if self.fail {
                return Err(io::Error::other("radio offline"));
            }
            self.sent.push(frame.to_vec());
            Ok(())
        }

        async fn receive(&mut self, _knock: &Knock, buf: &mut [u8]) -> io::Result<Option<usize>> {
            let Some(frame) = self.inbound.take() else {
                return Ok(None);
            };
            buf[..frame.len()].copy_from_slice(&frame);
            Ok(Some(frame.len()))
        }
    }

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .try_init();
    }

    fn setup(epoch: Epoch) -> (Tmesh, RadioId, CommunityId, MoteId) {
        let mut mesh = Tmesh::new(TmeshConfig::default().with_frame_size(16)).unwrap();
        let radio = mesh.radios_mut().register(Box::new(FakeRadio)).unwrap();
        let c = mesh
            .join(&MediumId::from_bytes([2; 5]), "lora", JoinOptions::default())
            .unwrap();
        let m = mesh.link(c, LinkId::from_bytes([1; 32])).unwrap();
        mesh.mote_mut(c, m).unwrap().add_epoch(epoch);
        (mesh, radio, c, m)
    }

    #[tokio::test(start_paused = true)]
    async fn test_clocks_agree_on_shared_base() {
        let a = Clock::with_offset(1_000_000);
        tokio::time::advance(Duration::from_millis(500)).await;
        let b = Clock::with_offset(1_500_000);

        assert_eq!(a.now_us(), b.now_us());
        assert_eq!(a.instant_at(7_000_000), b.instant_at(7_000_000));
        assert_eq!(b.instant_at(0), b.instant_at(1_500_000));

        // 2020-09-13
        assert!(Clock::from_unix().now_us() > 1_600_000_000_000_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transmit_waits_for_knock() {
        init_tracing();
        let (mut mesh, radio, c, m) = setup(Epoch::new(EpochKind::Link, Direction::Tx, [4; 32]));
        mesh.send(c, m, b"hi").unwrap();

        let expected = mesh.knock(0, radio).unwrap();
        let mut host = KnockLoop::new(mesh, radio, Loopback::default()).unwrap();
        let delivered = host.run_once().await.unwrap();

        assert!(delivered.is_empty());
        assert!(host.clock().now_us() >= expected.start());
        assert_eq!(host.transceiver().sent.len(), 1);
        assert_eq!(&host.transceiver().sent[0][..5], &[4, 2, b'h', b'i', 0]);
        assert_eq!(host.mesh().community(c).unwrap().pipe().frames_sent(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_delivers_packet() {
        init_tracing();
        let (mesh, radio, c, _) = setup(Epoch::new(EpochKind::Link, Direction::Rx, [4; 32]));
        let transceiver = Loopback {
            inbound: Some(vec![7, 5, b'h', b'e', b'l', b'l', b'o', 0]),
            ..Default::default()
        };

        let mut host = KnockLoop::new(mesh, radio, transceiver).unwrap();
        let delivered = host.run_once().await.unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].packet, b"hello");
        assert_eq!(delivered[0].community, c);

        // nothing heard is not an error
        assert!(host.run_once().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_link_moves_to_next_window() {
        let (mesh, radio, _, _) = setup(Epoch::new(EpochKind::Link, Direction::Tx, [4; 32]));
        let first = mesh.knock(0, radio).unwrap();
        let mut host = KnockLoop::new(mesh, radio, Loopback::default()).unwrap();

        // nothing queued, so neither knock transmits
        host.run_once().await.unwrap();
        host.run_once().await.unwrap();
        assert!(host.transceiver().sent.is_empty());
        assert!(host.clock().now_us() > first.start());
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_frame_keeps_running() {
        let (mesh, radio, _, _) = setup(Epoch::new(EpochKind::Link, Direction::Rx, [4; 32]));
        let transceiver = Loopback {
            inbound: Some(vec![9, 1]),
            ..Default::default()
        };

        let mut host = KnockLoop::new(mesh, radio, transceiver).unwrap();
        assert!(host.run_once().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_when_nothing_scheduled() {
        let (mesh, radio, _, _) = setup(Epoch::random(EpochKind::Reset, Direction::Tx));
        let mut host = KnockLoop::new(mesh, radio, Loopback::default())
            .unwrap()
            .with_idle(Duration::from_secs(2));

        assert!(host.run_once().await.unwrap().is_empty());
        assert!(host.clock().now_us() >= 2_000_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_radio_rejected() {
        let (mesh, _, _, _) = setup(Epoch::random(EpochKind::Link, Direction::Tx));
        let err = KnockLoop::new(mesh, RadioId(3), Loopback::default()).unwrap_err();
        assert!(matches!(
            err,
            TmeshError::Radio(RadioError::UnknownDevice(RadioId(3)))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_io_error() {
        let (mut mesh, radio, c, m) = setup(Epoch::new(EpochKind::Link, Direction::Tx, [4; 32]));
        mesh.send(c, m, b"hi").unwrap();
        let transceiver = Loopback {
            fail: true,
            ..Default::default()
        };

        let mut host = KnockLoop::new(mesh, radio, transceiver).unwrap();
        let err = host.run(|_| {}).await.unwrap_err();
        assert!(matches!(err, TmeshError::Io(_)));
    }
}
