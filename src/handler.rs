//! Per-connection request handler: the two-level OP → CMD state machine
//! (§4.5). One instance owns one accepted TCP connection exclusively.

use std::net::TcpStream;
use std::sync::Arc;

use crate::error::{Result, UsbIpError};
use crate::registrar::Registrar;
use crate::wire::cmd::{CmdHeader, CmdSubmit, CmdUnlink};
use crate::wire::op::{OpHeader, OpReqImport, OpRepDevList, OpRepImport};
use crate::wire::{CMD_SUBMIT, CMD_UNLINK, OP_REQ_DEVLIST, OP_REQ_IMPORT, OP_STATUS_ERROR, OP_STATUS_OK};
use crate::worker::WorkerPool;

/// Runs one connection to completion: OP-level handshake, then (if IMPORT
/// succeeded) the CMD-level loop until EOF or a fatal protocol error.
pub fn handle_connection(stream: TcpStream, registrar: Arc<Registrar>) -> Result<()> {
    let mut reader = stream.try_clone()?;
    let mut writer = stream;

    let op_header = match OpHeader::decode(&mut reader) {
        Ok(header) => header,
        Err(UsbIpError::EndOfStream) => return Ok(()),
        Err(e) => return Err(e),
    };

    match op_header.code {
        OP_REQ_DEVLIST => {
            handle_devlist(&mut writer, &registrar)?;
            Ok(())
        }
        OP_REQ_IMPORT => match handle_import(&mut reader, &mut writer, &registrar)? {
            Some(worker_pool) => cmd_loop(&mut reader, &worker_pool),
            None => Ok(()),
        },
        other => Err(UsbIpError::UnknownCommand(other as u32)),
    }
}

fn handle_devlist(writer: &mut TcpStream, registrar: &Registrar) -> Result<()> {
    let devices = registrar.available();
    let infos: Vec<_> = devices.iter().map(|d| d.device_info()).collect();

    log::info!("OP_REQ_DEVLIST: {} device(s) available", infos.len());
    OpRepDevList::header().encode(writer)?;
    let reply = OpRepDevList { devices: infos };
    reply.encode(writer)
}

/// Returns `Some(pool)` (with the pool already started) on success,
/// `None` once the error reply has been written and the connection should
/// close.
fn handle_import(
    reader: &mut TcpStream,
    writer: &mut TcpStream,
    registrar: &Registrar,
) -> Result<Option<Arc<WorkerPool<TcpStream>>>> {
    let req = OpReqImport::decode(reader)?;

    match registrar.get(&req.bus_id) {
        Ok(device) => {
            let reply_header = OpRepImport::header(OP_STATUS_OK);
            reply_header.encode(writer)?;
            let reply = OpRepImport {
                device_info: device.device_info().truncated,
            };
            reply.encode(writer)?;

            let reply_writer = writer.try_clone()?;
            let pool = Arc::new(WorkerPool::new(device.clone(), reply_writer));
            pool.start();

            log::info!(
                "device attached: busid={}",
                String::from_utf8_lossy(&req.bus_id).trim_end_matches('\0')
            );
            Ok(Some(pool))
        }
        Err(UsbIpError::DeviceNotFound) => {
            log::warn!("OP_REQ_IMPORT for unknown BusId");
            OpRepImport::header(OP_STATUS_ERROR).encode(writer)?;
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

fn cmd_loop(reader: &mut TcpStream, pool: &WorkerPool<TcpStream>) -> Result<()> {
    let result = (|| -> Result<()> {
        loop {
            let header = match CmdHeader::decode(reader) {
                Ok(header) => header,
                Err(UsbIpError::EndOfStream) => return Ok(()),
                Err(e) => return Err(e),
            };

            match header.command {
                CMD_SUBMIT => {
                    let submit = CmdSubmit::decode(reader, header)?;
                    pool.publish_cmd_submit(submit);
                }
                CMD_UNLINK => {
                    let unlink = CmdUnlink::decode(reader, header)?;
                    pool.unlink(unlink);
                }
                other => return Err(UsbIpError::UnknownCommand(other)),
            }
        }
    })();

    pool.stop();
    result
}
