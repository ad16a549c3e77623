use super::proto::{self, cmd, info, opt, rep, Request};
use super::{Error, Result};
use crate::backend::BlockBackend;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor, Read, Write};
use std::sync::Arc;

/// Upper bound for the payload of a single negotiation option.
const MAX_OPTION_LEN: u32 = 64 * 1024;
/// Upper bound for a single read or write request.
const MAX_REQUEST_LEN: u32 = 32 * 1024 * 1024;

/// A named device offered to clients.
pub struct Export {
    pub name: String,
    pub description: String,
    pub backend: Arc<dyn BlockBackend>,
}

#[derive(Debug, Clone)]
pub struct Options {
    pub read_only: bool,
    pub minimum_block_size: u32,
    pub preferred_block_size: u32,
    pub maximum_block_size: u32,
}

impl Options {
    /// Constraints for a device that transfers in units of `block_size`.
    pub fn for_block_size(block_size: u32, read_only: bool) -> Self {
        Self {
            read_only,
            minimum_block_size: block_size,
            preferred_block_size: block_size,
            maximum_block_size: block_size,
        }
    }

    fn transmission_flags(&self) -> u16 {
        let mut flags = proto::FLAG_HAS_FLAGS | proto::FLAG_SEND_FLUSH;
        if self.read_only {
            flags |= proto::FLAG_READ_ONLY;
        }
        flags
    }
}

/// Serve one client connection until it disconnects.
pub fn handle<S: Read + Write>(mut conn: S, exports: &[Export], options: &Options) -> Result<()> {
    let export = match negotiate(&mut conn, exports, options)? {
        Some(export) => export,
        None => return Ok(()),
    };

    log::debug!("client selected export {:?}", export.name);
    transmit(&mut conn, export, options)
}

fn find_export<'a>(exports: &'a [Export], name: &str) -> Option<&'a Export> {
    if name.is_empty() {
        return exports.first();
    }
    exports.iter().find(|export| export.name == name)
}

/// Payload of `NBD_OPT_INFO` and `NBD_OPT_GO`.
struct InfoRequest {
    name: String,
    requests: Vec<u16>,
}

impl InfoRequest {
    fn parse(data: &[u8]) -> io::Result<Self> {
        let mut reader = Cursor::new(data);

        let name_len = reader.read_u32::<BigEndian>()? as usize;
        if name_len > data.len() {
            return Err(io::ErrorKind::InvalidData.into());
        }
        let mut name = vec![0u8; name_len];
        reader.read_exact(&mut name)?;

        let count = reader.read_u16::<BigEndian>()?;
        let requests = (0..count)
            .map(|_| reader.read_u16::<BigEndian>())
            .collect::<io::Result<Vec<_>>>()?;

        if reader.position() != data.len() as u64 {
            return Err(io::ErrorKind::InvalidData.into());
        }
        Ok(Self {
            name: String::from_utf8_lossy(&name).into_owned(),
            requests,
        })
    }
}

fn send_info<W: Write>(
    conn: &mut W,
    option: u32,
    export: &Export,
    options: &Options,
    requests: &[u16],
) -> io::Result<()> {
    let mut data = Vec::new();
    data.write_u16::<BigEndian>(info::EXPORT)?;
    data.write_u64::<BigEndian>(export.backend.size())?;
    data.write_u16::<BigEndian>(options.transmission_flags())?;
    proto::write_option_reply(conn, option, rep::INFO, &data)?;

    if requests.contains(&info::NAME) {
        let mut data = Vec::new();
        data.write_u16::<BigEndian>(info::NAME)?;
        data.write_all(export.name.as_bytes())?;
        proto::write_option_reply(conn, option, rep::INFO, &data)?;
    }

    if requests.contains(&info::DESCRIPTION) {
        let mut data = Vec::new();
        data.write_u16::<BigEndian>(info::DESCRIPTION)?;
        data.write_all(export.description.as_bytes())?;
        proto::write_option_reply(conn, option, rep::INFO, &data)?;
    }

    // Always sent: clients must not issue requests the tape cannot take.
    let mut data = Vec::new();
    data.write_u16::<BigEndian>(info::BLOCK_SIZE)?;
    data.write_u32::<BigEndian>(options.minimum_block_size)?;
    data.write_u32::<BigEndian>(options.preferred_block_size)?;
    data.write_u32::<BigEndian>(options.maximum_block_size)?;
    proto::write_option_reply(conn, option, rep::INFO, &data)?;

    proto::write_option_reply(conn, option, rep::ACK, &[])
}

/// Run the option haggling phase. `None` means the client aborted.
fn negotiate<'a, S: Read + Write>(
    conn: &mut S,
    exports: &'a [Export],
    options: &Options,
) -> Result<Option<&'a Export>> {
    conn.write_u64::<BigEndian>(proto::NBD_MAGIC)?;
    conn.write_u64::<BigEndian>(proto::IHAVEOPT)?;
    conn.write_u16::<BigEndian>(proto::FLAG_FIXED_NEWSTYLE | proto::FLAG_NO_ZEROES)?;
    conn.flush()?;

    let client_flags = conn.read_u32::<BigEndian>()?;
    if client_flags & proto::FLAG_C_FIXED_NEWSTYLE == 0 {
        log::debug!("client does not speak fixed newstyle");
    }
    let no_zeroes = client_flags & proto::FLAG_C_NO_ZEROES != 0;

    loop {
        proto::expect_magic(conn, proto::IHAVEOPT)?;
        let option = conn.read_u32::<BigEndian>()?;
        let len = conn.read_u32::<BigEndian>()?;
        if len > MAX_OPTION_LEN {
            return Err(Error::OptionTooLarge(len));
        }
        let mut data = vec![0u8; len as usize];
        conn.read_exact(&mut data)?;
        log::trace!("option {option} with {len} bytes");

        match option {
            opt::EXPORT_NAME => {
                let name = String::from_utf8_lossy(&data);
                let export = find_export(exports, &name)
                    .ok_or_else(|| Error::UnknownExport(name.to_string()))?;

                conn.write_u64::<BigEndian>(export.backend.size())?;
                conn.write_u16::<BigEndian>(options.transmission_flags())?;
                if !no_zeroes {
                    conn.write_all(&[0u8; 124])?;
                }
                conn.flush()?;
                return Ok(Some(export));
            }
            opt::ABORT => {
                proto::write_option_reply(conn, option, rep::ACK, &[])?;
                conn.flush()?;
                return Ok(None);
            }
            opt::LIST => {
                if !data.is_empty() {
                    proto::write_option_reply(conn, option, rep::ERR_INVALID, &[])?;
                } else {
                    for export in exports {
                        let mut reply = Vec::new();
                        reply.write_u32::<BigEndian>(export.name.len() as u32)?;
                        reply.write_all(export.name.as_bytes())?;
                        reply.write_all(export.description.as_bytes())?;
                        proto::write_option_reply(conn, option, rep::SERVER, &reply)?;
                    }
                    proto::write_option_reply(conn, option, rep::ACK, &[])?;
                }
            }
            opt::INFO | opt::GO => {
                let request = match InfoRequest::parse(&data) {
                    Ok(request) => request,
                    Err(_) => {
                        proto::write_option_reply(conn, option, rep::ERR_INVALID, &[])?;
                        conn.flush()?;
                        continue;
                    }
                };

                match find_export(exports, &request.name) {
                    None => proto::write_option_reply(conn, option, rep::ERR_UNKNOWN, &[])?,
                    Some(export) => {
                        send_info(conn, option, export, options, &request.requests)?;
                        if option == opt::GO {
                            conn.flush()?;
                            return Ok(Some(export));
                        }
                    }
                }
            }
            _ => proto::write_option_reply(conn, option, rep::ERR_UNSUP, &[])?,
        }
        conn.flush()?;
    }
}

fn errno(err: &crate::Error) -> u32 {
    match err {
        crate::Error::ChunkSizeMismatch { .. }
        | crate::Error::UnalignedOffset { .. }
        | crate::Error::OutOfRange { .. } => libc::EINVAL as u32,
        _ => libc::EIO as u32,
    }
}

fn in_range(offset: u64, length: u32, size: u64) -> bool {
    offset
        .checked_add(length as u64)
        .map_or(false, |end| end <= size)
}

fn transmit<S: Read + Write>(conn: &mut S, export: &Export, options: &Options) -> Result<()> {
    let backend = &export.backend;
    let size = backend.size();

    loop {
        let request = match Request::read_from(conn) {
            Ok(request) => request,
            Err(Error::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                log::debug!("client hung up without disconnecting");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        log::trace!("{request:?}");
        if request.flags != 0 {
            log::trace!("ignoring command flags {:#x}", request.flags);
        }

        if request.length > MAX_REQUEST_LEN {
            return Err(Error::RequestTooLarge(request.length));
        }

        match request.kind {
            cmd::READ => {
                if !in_range(request.offset, request.length, size) {
                    proto::write_simple_reply(conn, libc::EINVAL as u32, request.handle)?;
                } else {
                    let mut buf = vec![0u8; request.length as usize];
                    match backend.read_at(&mut buf, request.offset) {
                        Ok(_) => {
                            proto::write_simple_reply(conn, 0, request.handle)?;
                            conn.write_all(&buf)?;
                        }
                        Err(e) => {
                            let (length, offset) = (request.length, request.offset);
                            log::warn!("read of {length} bytes at {offset} failed: {e}");
                            proto::write_simple_reply(conn, errno(&e), request.handle)?;
                        }
                    }
                }
            }
            cmd::WRITE => {
                // The payload has to be consumed even if the write gets refused.
                let mut buf = vec![0u8; request.length as usize];
                conn.read_exact(&mut buf)?;

                let error = if options.read_only {
                    libc::EPERM as u32
                } else if !in_range(request.offset, request.length, size) {
                    libc::ENOSPC as u32
                } else {
                    match backend.write_at(&buf, request.offset) {
                        Ok(_) => 0,
                        Err(e) => {
                            let (length, offset) = (request.length, request.offset);
                            log::warn!("write of {length} bytes at {offset} failed: {e}");
                            errno(&e)
                        }
                    }
                };
                proto::write_simple_reply(conn, error, request.handle)?;
            }
            cmd::FLUSH => {
                let error = match backend.sync() {
                    Ok(()) => 0,
                    Err(e) => errno(&e),
                };
                proto::write_simple_reply(conn, error, request.handle)?;
            }
            cmd::DISC => {
                log::debug!("client disconnected");
                return Ok(());
            }
            kind => {
                log::debug!("unsupported command {kind}");
                proto::write_simple_reply(conn, libc::EINVAL as u32, request.handle)?;
            }
        }
        conn.flush()?;
    }
}
