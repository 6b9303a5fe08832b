//! Bounded URB worker pool: three queues, three worker groups, and the
//! three-state per-URB lifecycle table that resolves races against UNLINK
//! (§4.6). This generalizes the teacher's thread+channel concurrency idiom
//! to the bounded, multi-stage pipeline the protocol needs; the lifecycle
//! table itself replaces the two-map design in the original Go `worker.go`
//! (see the open-question note in `DESIGN.md`).

use std::collections::HashMap;
use std::io::Write;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::device::Device;
use crate::wire::cmd::{CmdSubmit, CmdUnlink, RetSubmit, RetUnlink};
use crate::wire::{ECONNRESET, RET_UNLINK};

/// Capacity of each of the three bounded queues, matching the original
/// `URB_QUEUE_SIZE`.
const QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UrbState {
    Processing,
    Unlinking,
    Replying,
}

type SharedReceiver<T> = Arc<Mutex<Receiver<T>>>;

/// Coordinates URB processing for one attached device on one connection.
pub struct WorkerPool<W: Write + Send + 'static> {
    device: Arc<dyn Device>,
    writer: Arc<Mutex<W>>,

    table: Arc<Mutex<HashMap<u32, UrbState>>>,

    cmd_tx: Mutex<Option<SyncSender<CmdSubmit>>>,
    cmd_rx: SharedReceiver<CmdSubmit>,
    ret_tx: Mutex<Option<SyncSender<RetSubmit>>>,
    ret_rx: SharedReceiver<RetSubmit>,
    unlink_tx: Mutex<Option<SyncSender<RetUnlink>>>,
    unlink_rx: SharedReceiver<RetUnlink>,

    submit_handles: Mutex<Vec<JoinHandle<()>>>,
    reply_handles: Mutex<Vec<JoinHandle<()>>>,
    unlink_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl<W: Write + Send + 'static> WorkerPool<W> {
    pub fn new(device: Arc<dyn Device>, writer: W) -> Self {
        let (cmd_tx, cmd_rx) = sync_channel(QUEUE_CAPACITY);
        let (ret_tx, ret_rx) = sync_channel(QUEUE_CAPACITY);
        let (unlink_tx, unlink_rx) = sync_channel(QUEUE_CAPACITY);

        Self {
            device,
            writer: Arc::new(Mutex::new(writer)),
            table: Arc::new(Mutex::new(HashMap::new())),
            cmd_tx: Mutex::new(Some(cmd_tx)),
            cmd_rx: Arc::new(Mutex::new(cmd_rx)),
            ret_tx: Mutex::new(Some(ret_tx)),
            ret_rx: Arc::new(Mutex::new(ret_rx)),
            unlink_tx: Mutex::new(Some(unlink_tx)),
            unlink_rx: Arc::new(Mutex::new(unlink_rx)),
            submit_handles: Mutex::new(Vec::new()),
            reply_handles: Mutex::new(Vec::new()),
            unlink_handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawns the three worker groups per the device's [`WorkerPoolProfile`].
    pub fn start(&self) {
        let profile = self.device.worker_pool_profile();

        let ret_tx = self
            .ret_tx
            .lock()
            .unwrap()
            .as_ref()
            .expect("worker pool started after stop")
            .clone();
        for _ in 0..profile.max_proc_workers {
            let cmd_rx = self.cmd_rx.clone();
            let ret_tx = ret_tx.clone();
            let table = self.table.clone();
            let device = self.device.clone();
            let handle = thread::spawn(move || submit_worker_loop(cmd_rx, ret_tx, table, device));
            self.submit_handles.lock().unwrap().push(handle);
        }

        for _ in 0..profile.max_reply_workers {
            let ret_rx = self.ret_rx.clone();
            let table = self.table.clone();
            let writer = self.writer.clone();
            let handle = thread::spawn(move || reply_worker_loop(ret_rx, table, writer));
            self.reply_handles.lock().unwrap().push(handle);
        }

        for _ in 0..profile.max_unlink_reply_workers {
            let unlink_rx = self.unlink_rx.clone();
            let writer = self.writer.clone();
            let handle = thread::spawn(move || unlink_reply_worker_loop(unlink_rx, writer));
            self.unlink_handles.lock().unwrap().push(handle);
        }
    }

    /// `publish_cmd_submit(urb)` per §4.6: inserts `PROCESSING` if absent,
    /// logs and drops a duplicate `SeqNum` (invariant I4 violated by peer).
    pub fn publish_cmd_submit(&self, urb: CmdSubmit) {
        let seq_num = urb.header.seq_num;
        {
            let mut table = self.table.lock().unwrap();
            if table.contains_key(&seq_num) {
                log::warn!("duplicate URB SeqNum={seq_num}, dropping");
                return;
            }
            table.insert(seq_num, UrbState::Processing);
        }
        log::debug!("publishing CmdSubmit SeqNum={seq_num}");

        let tx = self.cmd_tx.lock().unwrap();
        if let Some(tx) = tx.as_ref() {
            if tx.send(urb).is_err() {
                log::error!("cmd queue closed, dropping SeqNum={seq_num}");
            }
        } else {
            log::warn!("worker pool stopped, dropping SeqNum={seq_num}");
        }
    }

    /// `unlink(cmd)` per §4.6: transitions the table and always enqueues a
    /// `RetUnlink`, regardless of whether the URB was known. Both
    /// `PROCESSING` and `REPLYING` entries are raced against: the latter
    /// covers unlink arriving after `device.process()` has returned but
    /// before the reply worker has dequeued and written it.
    pub fn unlink(&self, cmd: CmdUnlink) {
        let status = {
            let mut table = self.table.lock().unwrap();
            match table.get_mut(&cmd.unlink_seq_num) {
                Some(state) if *state != UrbState::Unlinking => {
                    *state = UrbState::Unlinking;
                    ECONNRESET
                }
                _ => 0,
            }
        };

        let mut header = cmd.header;
        header.command = RET_UNLINK;
        let ret_unlink = RetUnlink { header, status };

        let tx = self.unlink_tx.lock().unwrap();
        if let Some(tx) = tx.as_ref() {
            if tx.send(ret_unlink).is_err() {
                log::error!("unlink queue closed, dropping RetUnlink for UnlinkSeqNum={}", cmd.unlink_seq_num);
            }
        }
    }

    /// Shutdown per §4.6/§5: close `cmd_queue`, join submit workers, close
    /// the reply queues, join reply workers. Idempotent.
    pub fn stop(&self) {
        self.cmd_tx.lock().unwrap().take();
        for handle in self.submit_handles.lock().unwrap().drain(..) {
            let _ = handle.join();
        }

        self.ret_tx.lock().unwrap().take();
        self.unlink_tx.lock().unwrap().take();
        for handle in self.reply_handles.lock().unwrap().drain(..) {
            let _ = handle.join();
        }
        for handle in self.unlink_handles.lock().unwrap().drain(..) {
            let _ = handle.join();
        }
    }
}

fn submit_worker_loop(
    cmd_rx: SharedReceiver<CmdSubmit>,
    ret_tx: SyncSender<RetSubmit>,
    table: Arc<Mutex<HashMap<u32, UrbState>>>,
    device: Arc<dyn Device>,
) {
    loop {
        let urb = {
            let rx = cmd_rx.lock().unwrap();
            match rx.recv() {
                Ok(urb) => urb,
                Err(_) => return, // cmd_queue closed: drain complete.
            }
        };

        let seq_num = urb.header.seq_num;
        let should_process = {
            let mut table = table.lock().unwrap();
            match table.get_mut(&seq_num) {
                Some(state) if *state == UrbState::Processing => {
                    *state = UrbState::Replying;
                    true
                }
                Some(_) => {
                    // UNLINKING: drop the entry, never call the device.
                    table.remove(&seq_num);
                    log::debug!("SeqNum={seq_num} unlinked before processing, skipping");
                    false
                }
                None => false,
            }
        };

        if !should_process {
            continue;
        }

        let ret = device.process(urb);
        if ret_tx.send(ret).is_err() {
            log::error!("ret queue closed, dropping RetSubmit for SeqNum={seq_num}");
        }
    }
}

fn reply_worker_loop<W: Write>(
    ret_rx: SharedReceiver<RetSubmit>,
    table: Arc<Mutex<HashMap<u32, UrbState>>>,
    writer: Arc<Mutex<W>>,
) {
    loop {
        let ret = {
            let rx = ret_rx.lock().unwrap();
            match rx.recv() {
                Ok(ret) => ret,
                Err(_) => return,
            }
        };

        let seq_num = ret.header.seq_num;
        let should_write = {
            let mut table = table.lock().unwrap();
            match table.remove(&seq_num) {
                Some(UrbState::Replying) => true,
                Some(UrbState::Unlinking) => {
                    log::debug!("SeqNum={seq_num} unlinked after completion, suppressing reply");
                    false
                }
                _ => false,
            }
        };

        if !should_write {
            continue;
        }

        log::debug!("replying RetSubmit SeqNum={seq_num}");
        let mut writer = writer.lock().unwrap();
        if let Err(e) = ret.encode(&mut *writer) {
            log::error!("unable to write RetSubmit: {e}");
        }
    }
}

fn unlink_reply_worker_loop<W: Write>(unlink_rx: SharedReceiver<RetUnlink>, writer: Arc<Mutex<W>>) {
    loop {
        let ret = {
            let rx = unlink_rx.lock().unwrap();
            match rx.recv() {
                Ok(ret) => ret,
                Err(_) => return,
            }
        };

        let mut writer = writer.lock().unwrap();
        if let Err(e) = ret.encode(&mut *writer) {
            log::error!("unable to write RetUnlink: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::WorkerPoolProfile;
    use crate::wire::cmd::{CmdHeader, Direction};
    use crate::wire::{CMD_SUBMIT, CMD_UNLINK};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct SlowDevice {
        profile: WorkerPoolProfile,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl Device for SlowDevice {
        fn set_bus_id(&self, _: u32, _: u32, _: crate::wire::op::BusId, _: crate::wire::op::Path) {}
        fn bus_id(&self) -> crate::wire::op::BusId {
            [0; 32]
        }
        fn device_info(&self) -> crate::wire::op::DeviceInfo {
            unimplemented!()
        }
        fn worker_pool_profile(&self) -> WorkerPoolProfile {
            self.profile
        }
        fn process(&self, submit: CmdSubmit) -> RetSubmit {
            self.calls.fetch_add(1, Ordering::SeqCst);
            thread::sleep(self.delay);
            RetSubmit::success(submit.header, vec![1, 2, 3])
        }
        fn close(&self) -> crate::error::Result<()> {
            Ok(())
        }
    }

    fn submit_header(seq_num: u32) -> CmdHeader {
        CmdHeader {
            command: CMD_SUBMIT,
            seq_num,
            dev_id: 1,
            direction: Direction::In as u32,
            endpoint_number: 1,
        }
    }

    fn make_submit(seq_num: u32) -> CmdSubmit {
        CmdSubmit {
            header: submit_header(seq_num),
            transfer_flags: 0,
            transfer_buffer_length: 0,
            start_frame: 0,
            number_of_packets: 0xFFFF_FFFF,
            interval: 0,
            setup: [0; 8],
            transfer_buffer: Vec::new(),
            iso_packet_descriptors: Vec::new(),
        }
    }

    #[test]
    fn unlink_before_submit_returns_status_zero_and_no_ret_submit_follows() {
        let device = Arc::new(SlowDevice {
            profile: WorkerPoolProfile {
                max_proc_workers: 1,
                max_reply_workers: 1,
                max_unlink_reply_workers: 1,
            },
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(0),
        });
        let pool = WorkerPool::new(device, Vec::<u8>::new());
        pool.start();

        let unlink_header = CmdHeader {
            command: CMD_UNLINK,
            seq_num: 2,
            dev_id: 1,
            direction: Direction::Out as u32,
            endpoint_number: 0,
        };
        pool.unlink(CmdUnlink {
            header: unlink_header,
            unlink_seq_num: 1,
        });

        thread::sleep(Duration::from_millis(20));
        pool.stop();

        let bytes = pool.writer.lock().unwrap().clone();
        // RetUnlink only: CmdHeader(20) + status(4) + padding(24) = 48 bytes.
        assert_eq!(bytes.len(), 48);
        let status = i32::from_be_bytes(bytes[20..24].try_into().unwrap());
        assert_eq!(status, 0);
    }

    #[test]
    fn unlink_during_replying_suppresses_ret_submit_and_returns_econnreset() {
        let device = Arc::new(SlowDevice {
            profile: WorkerPoolProfile {
                max_proc_workers: 1,
                max_reply_workers: 1,
                max_unlink_reply_workers: 1,
            },
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(50),
        });
        let pool = WorkerPool::new(device, Vec::<u8>::new());
        pool.start();

        pool.publish_cmd_submit(make_submit(1));
        // Give the submit worker time to dequeue and flip Processing -> Replying
        // (it's sleeping inside device.process()) before racing the unlink.
        thread::sleep(Duration::from_millis(10));

        let unlink_header = CmdHeader {
            command: CMD_UNLINK,
            seq_num: 2,
            dev_id: 1,
            direction: Direction::Out as u32,
            endpoint_number: 0,
        };
        pool.unlink(CmdUnlink {
            header: unlink_header,
            unlink_seq_num: 1,
        });

        thread::sleep(Duration::from_millis(100));
        pool.stop();

        let bytes = pool.writer.lock().unwrap().clone();
        // RetUnlink only: CmdHeader(20) + status(4) + padding(24) = 48 bytes.
        // No RetSubmit follows, so this is the entire write.
        assert_eq!(bytes.len(), 48);
        let command = u32::from_be_bytes(bytes[0..4].try_into().unwrap());
        assert_eq!(command, RET_UNLINK);
        let status = i32::from_be_bytes(bytes[20..24].try_into().unwrap());
        assert_eq!(status, ECONNRESET);
    }

    #[test]
    fn ordering_is_preserved_under_profile_one_one_one() {
        let device = Arc::new(SlowDevice {
            profile: WorkerPoolProfile {
                max_proc_workers: 1,
                max_reply_workers: 1,
                max_unlink_reply_workers: 1,
            },
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(1),
        });
        let pool = WorkerPool::new(device, Vec::<u8>::new());
        pool.start();

        for seq in 1..=5u32 {
            pool.publish_cmd_submit(make_submit(seq));
        }
        thread::sleep(Duration::from_millis(100));
        pool.stop();

        let bytes = pool.writer.lock().unwrap().clone();
        // Each RetSubmit is CmdHeader(20) + static(28) + payload(3) = 51 bytes.
        let mut seq_nums = Vec::new();
        let mut offset = 0;
        while offset < bytes.len() {
            let seq_num = u32::from_be_bytes(bytes[offset + 4..offset + 8].try_into().unwrap());
            seq_nums.push(seq_num);
            offset += 51;
        }
        assert_eq!(seq_nums, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn no_double_reply_for_any_seq_num() {
        let device = Arc::new(SlowDevice {
            profile: WorkerPoolProfile {
                max_proc_workers: 4,
                max_reply_workers: 4,
                max_unlink_reply_workers: 1,
            },
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(0),
        });
        let pool = WorkerPool::new(device, Vec::<u8>::new());
        pool.start();
        for seq in 1..=20u32 {
            pool.publish_cmd_submit(make_submit(seq));
        }
        thread::sleep(Duration::from_millis(200));
        pool.stop();

        let bytes = pool.writer.lock().unwrap().clone();
        let mut seen = std::collections::HashSet::new();
        let mut offset = 0;
        while offset < bytes.len() {
            let seq_num = u32::from_be_bytes(bytes[offset + 4..offset + 8].try_into().unwrap());
            assert!(seen.insert(seq_num), "SeqNum={seq_num} replied more than once");
            offset += 51;
        }
        assert_eq!(seen.len(), 20);
    }
}
