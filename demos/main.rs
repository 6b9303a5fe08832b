//! Runnable bootstrap: registers the sample mouse and echo devices, opens
//! the USB/IP server on `127.0.0.1:3240`, and waits for Ctrl-C before
//! shutting down gracefully. Grounded on `original_source/sample/main.go`
//! and the teacher's own `simple_logger` bootstrap in `src/main.rs`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use simple_logger::SimpleLogger;

use usbip_virtual_device::devices::echo::HidEchoDevice;
use usbip_virtual_device::devices::mouse::HidMouseDevice;
use usbip_virtual_device::registrar::{Registrar, RegistrarConfig};
use usbip_virtual_device::server::{Server, ServerConfig};

fn main() {
    SimpleLogger::new().init().unwrap();

    let registrar = Arc::new(Registrar::new(RegistrarConfig {
        bus_num: 1,
        max_device_count: 10,
    }));
    registrar
        .register(Arc::new(HidMouseDevice::new()))
        .expect("register mouse device");
    registrar
        .register(Arc::new(HidEchoDevice::new()))
        .expect("register echo device");

    let server = Server::new(
        ServerConfig {
            listen_address: "127.0.0.1:3240".to_string(),
            tcp_connection_timeout: Duration::from_secs(60),
            max_tcp_connections: 10,
        },
        registrar.clone(),
    );
    server.open().expect("open USB/IP server");
    log::info!("server is up");

    let shutdown_requested = Arc::new(AtomicBool::new(false));
    let handler_flag = shutdown_requested.clone();
    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::SeqCst);
    })
    .expect("install SIGINT/SIGTERM handler");

    while !shutdown_requested.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(200));
    }

    log::info!("shutting down");
    server.close();
    if let Err(e) = registrar.close() {
        log::error!("error closing registrar: {e}");
    }
}
