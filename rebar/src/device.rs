//! Device layer under PORT! values.
//!
//! A device serves [`DeviceRequest`]s: one request names a command and
//! carries the data going in or out. Port actors never touch the file
//! system or the clipboard directly; they fill in a request and hand it to
//! the [`DeviceTable`].

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::PathBuf;

use bitflags::bitflags;
use log::trace;
use thiserror::Error;

/// What the interpreter does when a script touches the file system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SecurityPolicy {
    #[default]
    Allow,
    /// raise an access error
    Deny,
    /// halt evaluation
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceCommand {
    Open,
    Close,
    Read,
    Write,
    Poll,
    Connect,
    Query,
    Modify,
    Create,
    Delete,
    Rename,
}

impl DeviceCommand {
    pub fn name(self) -> &'static str {
        match self {
            DeviceCommand::Open => "open",
            DeviceCommand::Close => "close",
            DeviceCommand::Read => "read",
            DeviceCommand::Write => "write",
            DeviceCommand::Poll => "poll",
            DeviceCommand::Connect => "connect",
            DeviceCommand::Query => "query",
            DeviceCommand::Modify => "modify",
            DeviceCommand::Create => "create",
            DeviceCommand::Delete => "delete",
            DeviceCommand::Rename => "rename",
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RequestFlags: u16 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        /// truncate or create on open
        const NEW = 1 << 2;
        const APPEND = 1 << 3;
        /// set by query when the target is a directory
        const DIR = 1 << 4;
        const OPEN = 1 << 5;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RequestData {
    #[default]
    None,
    Bytes(Vec<u8>),
    Socket(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceStatus {
    /// queued; poll again later
    Pending,
    Done,
}

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("{0} is not supported by this device")]
    Unsupported(&'static str),
    #[error("port is not open")]
    NotOpen,
    #[error("cannot open {path}: {source}")]
    Open { path: String, source: io::Error },
    #[error("cannot read {path}: {source}")]
    Read { path: String, source: io::Error },
    #[error("cannot write {path}: {source}")]
    Write { path: String, source: io::Error },
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl DeviceError {
    /// Negative status code stored in a failed request.
    pub fn code(&self) -> i32 {
        match self {
            DeviceError::Unsupported(_) => -1,
            DeviceError::NotOpen => -2,
            DeviceError::Open { .. } => -3,
            DeviceError::Read { .. } => -4,
            DeviceError::Write { .. } => -5,
            DeviceError::Io(_) => -6,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DeviceRequest {
    pub device: usize,
    pub command: Option<DeviceCommand>,
    pub flags: RequestFlags,
    /// 0, or the negative code of the last failure
    pub error: i32,
    pub data: RequestData,
    /// bytes requested (read) or total size (query)
    pub length: usize,
    /// bytes transferred
    pub actual: usize,
    pub path: Option<PathBuf>,
    /// rename destination
    pub target: Option<PathBuf>,
    /// device-side id of the open resource
    pub handle: Option<u32>,
}

impl DeviceRequest {
    pub fn new(device: usize) -> Self {
        Self {
            device,
            ..Default::default()
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    fn path_text(&self) -> String {
        self.path
            .as_ref()
            .map_or_else(String::new, |path| path.display().to_string())
    }
}

fn unsupported(command: DeviceCommand) -> Result<DeviceStatus, DeviceError> {
    Err(DeviceError::Unsupported(command.name()))
}

pub trait Device {
    fn name(&self) -> &'static str;

    fn open(&mut self, req: &mut DeviceRequest) -> Result<DeviceStatus, DeviceError>;
    fn close(&mut self, req: &mut DeviceRequest) -> Result<DeviceStatus, DeviceError>;
    fn read(&mut self, req: &mut DeviceRequest) -> Result<DeviceStatus, DeviceError>;
    fn write(&mut self, req: &mut DeviceRequest) -> Result<DeviceStatus, DeviceError>;

    /// Services pending work. True if anything changed.
    fn poll(&mut self) -> bool {
        false
    }

    fn query(&mut self, req: &mut DeviceRequest) -> Result<DeviceStatus, DeviceError>;

    fn modify(&mut self, _req: &mut DeviceRequest) -> Result<DeviceStatus, DeviceError> {
        unsupported(DeviceCommand::Modify)
    }

    fn connect(&mut self, _req: &mut DeviceRequest) -> Result<DeviceStatus, DeviceError> {
        unsupported(DeviceCommand::Connect)
    }

    fn create(&mut self, _req: &mut DeviceRequest) -> Result<DeviceStatus, DeviceError> {
        unsupported(DeviceCommand::Create)
    }

    fn delete(&mut self, _req: &mut DeviceRequest) -> Result<DeviceStatus, DeviceError> {
        unsupported(DeviceCommand::Delete)
    }

    fn rename(&mut self, _req: &mut DeviceRequest) -> Result<DeviceStatus, DeviceError> {
        unsupported(DeviceCommand::Rename)
    }
}

// ── file ─────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FileDevice {
    open: HashMap<u32, (PathBuf, File)>,
    next_id: u32,
}

impl FileDevice {
    fn file(&mut self, req: &DeviceRequest) -> Result<&mut (PathBuf, File), DeviceError> {
        req.handle
            .and_then(|id| self.open.get_mut(&id))
            .ok_or(DeviceError::NotOpen)
    }

    fn path(req: &DeviceRequest) -> Result<PathBuf, DeviceError> {
        req.path.clone().ok_or_else(|| DeviceError::Open {
            path: String::new(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "no path given"),
        })
    }
}

impl Device for FileDevice {
    fn name(&self) -> &'static str {
        "file"
    }

    fn open(&mut self, req: &mut DeviceRequest) -> Result<DeviceStatus, DeviceError> {
        let path = Self::path(req)?;
        let writing = req.flags.intersects(RequestFlags::WRITE | RequestFlags::NEW | RequestFlags::APPEND);
        let mut options = OpenOptions::new();
        options.read(req.flags.contains(RequestFlags::READ) || !writing);
        if writing {
            options.write(true).create(true);
        }
        if req.flags.contains(RequestFlags::NEW) {
            options.truncate(true);
        }
        if req.flags.contains(RequestFlags::APPEND) {
            options.append(true);
        }
        let file = options.open(&path).map_err(|source| DeviceError::Open {
            path: path.display().to_string(),
            source,
        })?;
        self.next_id += 1;
        let id = self.next_id;
        self.open.insert(id, (path, file));
        req.handle = Some(id);
        req.flags.insert(RequestFlags::OPEN);
        Ok(DeviceStatus::Done)
    }

    fn close(&mut self, req: &mut DeviceRequest) -> Result<DeviceStatus, DeviceError> {
        let id = req.handle.take().ok_or(DeviceError::NotOpen)?;
        let (path, file) = self.open.remove(&id).ok_or(DeviceError::NotOpen)?;
        file.sync_all().map_err(|source| DeviceError::Write {
            path: path.display().to_string(),
            source,
        })?;
        req.flags.remove(RequestFlags::OPEN);
        Ok(DeviceStatus::Done)
    }

    fn read(&mut self, req: &mut DeviceRequest) -> Result<DeviceStatus, DeviceError> {
        let wanted = req.length;
        let (path, file) = self.file(req)?;
        let mut bytes = Vec::new();
        let result = if wanted > 0 {
            Read::by_ref(file).take(wanted as u64).read_to_end(&mut bytes)
        } else {
            BufReader::new(&*file).read_to_end(&mut bytes)
        };
        result.map_err(|source| DeviceError::Read {
            path: path.display().to_string(),
            source,
        })?;
        req.actual = bytes.len();
        req.data = RequestData::Bytes(bytes);
        Ok(DeviceStatus::Done)
    }

    fn write(&mut self, req: &mut DeviceRequest) -> Result<DeviceStatus, DeviceError> {
        let RequestData::Bytes(bytes) = std::mem::take(&mut req.data) else {
            return Ok(DeviceStatus::Done);
        };
        let (path, file) = self.file(req)?;
        let path = path.display().to_string();
        let mut writer = BufWriter::new(&*file);
        writer
            .write_all(&bytes)
            .and_then(|_| writer.flush())
            .map_err(|source| DeviceError::Write { path, source })?;
        req.actual = bytes.len();
        Ok(DeviceStatus::Done)
    }

    fn query(&mut self, req: &mut DeviceRequest) -> Result<DeviceStatus, DeviceError> {
        let metadata = match req.handle.and_then(|id| self.open.get_mut(&id)) {
            Some((_, file)) => file.metadata()?,
            None => {
                let path = Self::path(req)?;
                fs::metadata(&path).map_err(|source| DeviceError::Read {
                    path: path.display().to_string(),
                    source,
                })?
            }
        };
        req.length = metadata.len() as usize;
        req.flags.set(RequestFlags::DIR, metadata.is_dir());
        Ok(DeviceStatus::Done)
    }

    fn create(&mut self, req: &mut DeviceRequest) -> Result<DeviceStatus, DeviceError> {
        let path = Self::path(req)?;
        if req.flags.contains(RequestFlags::DIR) {
            fs::create_dir_all(&path)?;
        } else {
            File::create(&path).map_err(|source| DeviceError::Open {
                path: path.display().to_string(),
                source,
            })?;
        }
        Ok(DeviceStatus::Done)
    }

    fn delete(&mut self, req: &mut DeviceRequest) -> Result<DeviceStatus, DeviceError> {
        let path = Self::path(req)?;
        if path.is_dir() {
            fs::remove_dir(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
        Ok(DeviceStatus::Done)
    }

    fn rename(&mut self, req: &mut DeviceRequest) -> Result<DeviceStatus, DeviceError> {
        let from = Self::path(req)?;
        let to = req.target.clone().ok_or(DeviceError::Unsupported("rename without target"))?;
        fs::rename(from, to)?;
        Ok(DeviceStatus::Done)
    }
}

// ── clipboard ────────────────────────────────────────────────────

/// Clipboard kept inside the process.
#[derive(Default)]
pub struct ClipboardDevice {
    contents: Vec<u8>,
    opened: u32,
}

impl Device for ClipboardDevice {
    fn name(&self) -> &'static str {
        "clipboard"
    }

    fn open(&mut self, req: &mut DeviceRequest) -> Result<DeviceStatus, DeviceError> {
        self.opened += 1;
        req.handle = Some(self.opened);
        req.flags.insert(RequestFlags::OPEN);
        Ok(DeviceStatus::Done)
    }

    fn close(&mut self, req: &mut DeviceRequest) -> Result<DeviceStatus, DeviceError> {
        req.handle.take().ok_or(DeviceError::NotOpen)?;
        req.flags.remove(RequestFlags::OPEN);
        Ok(DeviceStatus::Done)
    }

    fn read(&mut self, req: &mut DeviceRequest) -> Result<DeviceStatus, DeviceError> {
        req.handle.ok_or(DeviceError::NotOpen)?;
        req.actual = self.contents.len();
        req.data = RequestData::Bytes(self.contents.clone());
        Ok(DeviceStatus::Done)
    }

    fn write(&mut self, req: &mut DeviceRequest) -> Result<DeviceStatus, DeviceError> {
        req.handle.ok_or(DeviceError::NotOpen)?;
        if let RequestData::Bytes(bytes) = std::mem::take(&mut req.data) {
            req.actual = bytes.len();
            self.contents = bytes;
        }
        Ok(DeviceStatus::Done)
    }

    fn query(&mut self, req: &mut DeviceRequest) -> Result<DeviceStatus, DeviceError> {
        req.length = self.contents.len();
        Ok(DeviceStatus::Done)
    }
}

// ── table ────────────────────────────────────────────────────────

pub struct DeviceTable {
    devices: Vec<Box<dyn Device>>,
}

impl DeviceTable {
    pub fn new() -> Self {
        Self { devices: Vec::new() }
    }

    /// File and clipboard devices.
    pub fn standard() -> Self {
        let mut table = Self::new();
        table.register(Box::new(FileDevice::default()));
        table.register(Box::new(ClipboardDevice::default()));
        table
    }

    pub fn register(&mut self, device: Box<dyn Device>) -> usize {
        self.devices.push(device);
        self.devices.len() - 1
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.devices.iter().position(|device| device.name() == name)
    }

    /// Runs `command` on the device the request names.
    pub fn request(&mut self, command: DeviceCommand, req: &mut DeviceRequest) -> Result<DeviceStatus, DeviceError> {
        let device = self
            .devices
            .get_mut(req.device)
            .ok_or(DeviceError::Unsupported("unknown device"))?;
        trace!("{} {} {}", device.name(), command.name(), req.path_text());
        req.command = Some(command);
        req.error = 0;
        let result = match command {
            DeviceCommand::Open => device.open(req),
            DeviceCommand::Close => device.close(req),
            DeviceCommand::Read => device.read(req),
            DeviceCommand::Write => device.write(req),
            DeviceCommand::Poll => {
                device.poll();
                Ok(DeviceStatus::Done)
            }
            DeviceCommand::Connect => device.connect(req),
            DeviceCommand::Query => device.query(req),
            DeviceCommand::Modify => device.modify(req),
            DeviceCommand::Create => device.create(req),
            DeviceCommand::Delete => device.delete(req),
            DeviceCommand::Rename => device.rename(req),
        };
        if let Err(ref err) = result {
            req.error = err.code();
            trace!("{} {} failed: {err}", device.name(), command.name());
        }
        result
    }

    /// Polls every device once. True if any made progress.
    pub fn poll_all(&mut self) -> bool {
        self.devices
            .iter_mut()
            .fold(false, |changed, device| device.poll() || changed)
    }
}

impl Default for DeviceTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        let mut table = DeviceTable::standard();
        let file = table.find("file").unwrap();

        let mut req = DeviceRequest::new(file).with_path(&path);
        req.flags = RequestFlags::WRITE | RequestFlags::NEW;
        table.request(DeviceCommand::Open, &mut req).unwrap();
        req.data = RequestData::Bytes(b"hello".to_vec());
        table.request(DeviceCommand::Write, &mut req).unwrap();
        assert_eq!(req.actual, 5);
        table.request(DeviceCommand::Close, &mut req).unwrap();

        let mut req = DeviceRequest::new(file).with_path(&path);
        req.flags = RequestFlags::READ;
        table.request(DeviceCommand::Open, &mut req).unwrap();
        table.request(DeviceCommand::Read, &mut req).unwrap();
        assert_eq!(req.data, RequestData::Bytes(b"hello".to_vec()));
        table.request(DeviceCommand::Query, &mut req).unwrap();
        assert_eq!(req.length, 5);
        table.request(DeviceCommand::Close, &mut req).unwrap();
    }

    #[test]
    fn missing_file_fails_with_code() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = DeviceTable::standard();
        let mut req = DeviceRequest::new(0).with_path(dir.path().join("absent"));
        req.flags = RequestFlags::READ;
        let err = table.request(DeviceCommand::Open, &mut req).unwrap_err();
        assert!(matches!(err, DeviceError::Open { .. }));
        assert_eq!(req.error, -3);
    }

    #[test]
    fn closed_port_is_not_open() {
        let mut table = DeviceTable::standard();
        let mut req = DeviceRequest::new(0);
        let err = table.request(DeviceCommand::Read, &mut req).unwrap_err();
        assert!(matches!(err, DeviceError::NotOpen));
    }

    #[test]
    fn rename_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("a.txt");
        let to = dir.path().join("b.txt");
        let mut table = DeviceTable::standard();
        let mut req = DeviceRequest::new(0).with_path(&from);
        table.request(DeviceCommand::Create, &mut req).unwrap();
        req.target = Some(to.clone());
        table.request(DeviceCommand::Rename, &mut req).unwrap();
        assert!(to.exists() && !from.exists());
        let mut req = DeviceRequest::new(0).with_path(&to);
        table.request(DeviceCommand::Delete, &mut req).unwrap();
        assert!(!to.exists());
    }

    #[test]
    fn clipboard_keeps_last_write() {
        let mut table = DeviceTable::standard();
        let clip = table.find("clipboard").unwrap();
        let mut req = DeviceRequest::new(clip);
        table.request(DeviceCommand::Open, &mut req).unwrap();
        req.data = RequestData::Bytes(b"copied".to_vec());
        table.request(DeviceCommand::Write, &mut req).unwrap();
        table.request(DeviceCommand::Read, &mut req).unwrap();
        assert_eq!(req.data, RequestData::Bytes(b"copied".to_vec()));
        assert!(matches!(
            table.request(DeviceCommand::Connect, &mut req),
            Err(DeviceError::Unsupported("connect"))
        ));
    }
}
