//! Bounded TCP accept loop (§4.7), grounded on the original Go
//! `usbip/server.go` acceptor: an atomic connection counter enforcing
//! `MaxTCPConnection`, and a `quit` signal distinguishing an intentional
//! listener close from a genuine accept error.

use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::Result;
use crate::handler::handle_connection;
use crate::registrar::Registrar;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_address: String,
    pub tcp_connection_timeout: Duration,
    pub max_tcp_connections: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: "127.0.0.1:3240".to_string(),
            tcp_connection_timeout: Duration::from_secs(60),
            max_tcp_connections: 10,
        }
    }
}

/// A running USB/IP TCP server. `open` spawns the accept loop in a
/// background thread; `close` performs the graceful shutdown discipline of
/// §5: signal quit, let the accept loop exit, then join every per-connection
/// handler thread.
pub struct Server {
    config: ServerConfig,
    registrar: Arc<Registrar>,
    quit: Arc<AtomicBool>,
    conn_count: Arc<AtomicI64>,
    accept_handle: Mutex<Option<JoinHandle<()>>>,
    conn_handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl Server {
    pub fn new(config: ServerConfig, registrar: Arc<Registrar>) -> Self {
        Self {
            config,
            registrar,
            quit: Arc::new(AtomicBool::new(false)),
            conn_count: Arc::new(AtomicI64::new(0)),
            accept_handle: Mutex::new(None),
            conn_handles: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Binds the listener and spawns the accept loop. Returns once the
    /// socket is bound; accept and dispatch happen on a background thread.
    pub fn open(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.listen_address)?;
        log::info!("listening on {}", self.config.listen_address);

        let quit = self.quit.clone();
        let registrar = self.registrar.clone();
        let conn_handles = self.conn_handles.clone();
        let conn_count = self.conn_count.clone();
        let max_connections = self.config.max_tcp_connections;

        let accept_handle = thread::spawn(move || {
            for incoming in listener.incoming() {
                match incoming {
                    Ok(stream) => {
                        let count = conn_count.fetch_add(1, Ordering::SeqCst) + 1;
                        if count > max_connections {
                            log::error!(
                                "maximum TCP connection reached, dropping connection (count={count})"
                            );
                            drop(stream);
                            conn_count.fetch_sub(1, Ordering::SeqCst);
                            continue;
                        }

                        let registrar = registrar.clone();
                        let conn_count = conn_count.clone();
                        let handle = thread::spawn(move || {
                            if let Err(e) = handle_connection(stream, registrar) {
                                log::error!("connection terminated: {e}");
                            }
                            conn_count.fetch_sub(1, Ordering::SeqCst);
                        });
                        conn_handles.lock().unwrap().push(handle);
                    }
                    Err(e) => {
                        if quit.load(Ordering::SeqCst) {
                            return;
                        }
                        log::error!("unable to accept connection: {e}");
                    }
                }
            }
        });

        *self.accept_handle.lock().unwrap() = Some(accept_handle);
        Ok(())
    }

    /// Close per §5: signal quit, join the accept thread, then join every
    /// outstanding connection handler. Idempotent — a second call observes
    /// empty handle slots and returns immediately.
    ///
    /// The accept thread only notices `quit` on its next `accept` wakeup; in
    /// this sync, thread-per-connection design that wakeup is driven by the
    /// listener itself being dropped from the process exiting, or by a new
    /// connection arriving and failing the race. Callers that need a bounded
    /// `close()` should pair it with dropping the `TcpListener`, matching the
    /// original's reliance on `listener.Close()` unblocking `Accept`.
    pub fn close(&self) {
        self.quit.store(true, Ordering::SeqCst);
        if let Some(handle) = self.accept_handle.lock().unwrap().take() {
            let _ = handle.join();
        }
        for handle in self.conn_handles.lock().unwrap().drain(..) {
            let _ = handle.join();
        }
        log::info!("server closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Device;
    use crate::devices::mouse::HidMouseDevice;
    use crate::registrar::RegistrarConfig;
    use crate::wire::cmd::{CmdHeader, CmdSubmit, Direction};
    use crate::wire::op::OpHeader;
    use crate::wire::{CMD_SUBMIT, OP_REQ_IMPORT, OP_STATUS_ERROR};
    use std::io::{Read, Write};
    use std::net::TcpStream;
    use std::thread;
    use std::time::Duration;

    fn ephemeral_server(registrar: Arc<Registrar>, max_connections: i64) -> (Server, String) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);
        let server = Server::new(
            ServerConfig {
                listen_address: address.clone(),
                tcp_connection_timeout: Duration::from_secs(5),
                max_tcp_connections: max_connections,
            },
            registrar,
        );
        server.open().unwrap();
        thread::sleep(Duration::from_millis(50));
        (server, address)
    }

    /// S1 — DEVLIST of an empty registrar.
    #[test]
    fn devlist_of_empty_registrar_replies_empty_and_closes() {
        let registrar = Arc::new(Registrar::new(RegistrarConfig::default()));
        let (server, address) = ephemeral_server(registrar, 10);

        let mut stream = TcpStream::connect(&address).unwrap();
        stream.write_all(&[0x01, 0x11, 0x80, 0x05, 0x00, 0x00, 0x00, 0x00]).unwrap();

        let mut reply = Vec::new();
        stream.read_to_end(&mut reply).unwrap();
        assert_eq!(
            reply,
            vec![0x01, 0x11, 0x00, 0x05, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]
        );

        server.close();
    }

    /// S2 — IMPORT of an unknown BusId.
    #[test]
    fn import_unknown_bus_id_replies_error_and_closes() {
        let registrar = Arc::new(Registrar::new(RegistrarConfig::default()));
        let (server, address) = ephemeral_server(registrar, 10);

        let mut stream = TcpStream::connect(&address).unwrap();
        OpHeader::new(OP_REQ_IMPORT, 0).encode(&mut stream).unwrap();
        stream.write_all(&[0u8; 32]).unwrap();

        let mut reply = Vec::new();
        stream.read_to_end(&mut reply).unwrap();
        let status = u32::from_be_bytes(reply[4..8].try_into().unwrap());
        assert_eq!(status, OP_STATUS_ERROR);
        assert_eq!(reply.len(), 8); // no DeviceInfoTruncated body follows

        server.close();
    }

    /// S3 — IMPORT + single SUBMIT + RET_SUBMIT (device-to-host).
    #[test]
    fn import_then_submit_round_trips_a_urb() {
        let registrar = Arc::new(Registrar::new(RegistrarConfig::default()));
        let device = Arc::new(HidMouseDevice::new());
        registrar.register(device.clone()).unwrap();
        let (server, address) = ephemeral_server(registrar, 10);

        let mut stream = TcpStream::connect(&address).unwrap();
        OpHeader::new(OP_REQ_IMPORT, 0).encode(&mut stream).unwrap();
        stream.write_all(&device.bus_id()).unwrap();

        let mut header_buf = [0u8; 8];
        stream.read_exact(&mut header_buf).unwrap();
        assert_eq!(&header_buf[4..8], &[0, 0, 0, 0]); // OK status

        let mut info_buf = [0u8; 312];
        stream.read_exact(&mut info_buf).unwrap();

        let submit = CmdSubmit {
            header: CmdHeader {
                command: CMD_SUBMIT,
                seq_num: 1,
                dev_id: 1,
                direction: Direction::In as u32,
                endpoint_number: crate::devices::ENDPOINT_DEV_TO_HOST,
            },
            transfer_flags: 0,
            transfer_buffer_length: 3,
            start_frame: 0,
            number_of_packets: 0xFFFF_FFFF,
            interval: 0,
            setup: [0; 8],
            transfer_buffer: Vec::new(),
            iso_packet_descriptors: Vec::new(),
        };
        submit.encode(&mut stream).unwrap();

        let mut ret_header = [0u8; 20];
        stream.read_exact(&mut ret_header).unwrap();
        let seq_num = u32::from_be_bytes(ret_header[4..8].try_into().unwrap());
        assert_eq!(seq_num, 1);

        let mut ret_static = [0u8; 28];
        stream.read_exact(&mut ret_static).unwrap();
        let status = i32::from_be_bytes(ret_static[0..4].try_into().unwrap());
        let actual_length = u32::from_be_bytes(ret_static[4..8].try_into().unwrap());
        assert_eq!(status, 0);
        assert_eq!(actual_length, 4); // the mouse's fixed 4-byte report

        drop(stream); // unblocks the cmd-loop's blocking read with EOF
        server.close();
    }

    /// S6 — Capacity: a second connection beyond MaxTCPConnection is
    /// accepted and immediately closed; the first connection is unaffected.
    #[test]
    fn second_connection_beyond_capacity_is_closed_immediately() {
        let registrar = Arc::new(Registrar::new(RegistrarConfig::default()));
        let (server, address) = ephemeral_server(registrar, 1);

        let first = TcpStream::connect(&address).unwrap();
        thread::sleep(Duration::from_millis(50));

        let mut second = TcpStream::connect(&address).unwrap();
        let mut buf = [0u8; 1];
        let n = second.read(&mut buf).unwrap_or(0);
        assert_eq!(n, 0); // closed immediately, no bytes ever sent

        drop(first); // unblocks the first connection's blocking read with EOF
        server.close();
    }
}
