//! File server over an in-memory tree.

use std::collections::BTreeMap;

use hoststream_proto::{
    DataStream, ProtocolError, ServerId,
    ifs::{
        AccessMode, CloseRequest, CreateDirectoryRequest, DeleteDirectoryRequest, DeleteFileRequest,
        ExchangeAttributesReply, ExchangeAttributesRequest, FileEntry, ListAttributesRequest, ListEntryReply,
        ObjectType, OpenOption, OpenReply, OpenRequest, ReadReply, ReadRequest, RenameRequest, ReturnCodeReply,
        WriteReply, WriteRequest, id, rc,
    },
    text::{CCSID_UCS2, CCSID_UTF16},
};

use super::{Conn, HostState, Outcome};

/// Largest block the mock file server accepts or returns.
pub const HOST_MAX_DATA_BLOCK: u32 = 64 * 1024;

const HOST_DATASTREAM_LEVEL: u16 = 16;

#[derive(Debug, Clone)]
enum Content {
    File { data: Vec<u8>, ccsid: u16 },
    Directory,
}

#[derive(Debug, Clone)]
struct Node {
    content: Content,
    created: u64,
    modified: u64,
}

/// Handle opened by one connection.
#[derive(Debug, Clone)]
pub(crate) struct OpenFile {
    path: String,
    access: AccessMode,
}

/// Absolute, `/`-separated paths to nodes. The root always exists.
#[derive(Debug)]
pub(crate) struct FileSystem {
    nodes: BTreeMap<String, Node>,
}

/// `/a//b/` becomes `/a/b`.
fn normalize(path: &str) -> String {
    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    format!("/{}", parts.join("/"))
}

fn parent(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rsplit_once('/') {
        Some(("", _)) => Some("/"),
        Some((parent, _)) => Some(parent),
        None => None,
    }
}

fn base_name(path: &str) -> &str {
    path.rsplit_once('/').map_or(path, |(_, name)| name)
}

fn is_child_of(path: &str, dir: &str) -> bool {
    parent(path) == Some(dir)
}

fn is_within(path: &str, dir: &str) -> bool {
    path == dir || (path.starts_with(dir) && (dir == "/" || path[dir.len()..].starts_with('/')))
}

impl FileSystem {
    pub(crate) fn new() -> Self {
        let root = Node { content: Content::Directory, created: 0, modified: 0 };
        Self { nodes: BTreeMap::from([("/".to_string(), root)]) }
    }

    fn is_dir(&self, path: &str) -> bool {
        matches!(self.nodes.get(path), Some(Node { content: Content::Directory, .. }))
    }

    /// Return code for a missing `path`: whole path or last component.
    fn missing(&self, path: &str) -> u16 {
        match parent(path) {
            Some(dir) if self.is_dir(dir) => rc::FILE_NOT_FOUND,
            _ => rc::PATH_NOT_FOUND,
        }
    }

    pub(crate) fn create_all(&mut self, path: &str, now: u64) {
        let path = normalize(path);
        let mut current = String::new();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            current.push('/');
            current.push_str(part);
            self.nodes
                .entry(current.clone())
                .or_insert(Node { content: Content::Directory, created: now, modified: now });
        }
    }

    pub(crate) fn create_all_parents(&mut self, path: &str, now: u64) {
        let path = normalize(path);
        if let Some(dir) = parent(&path) {
            self.create_all(dir, now);
        }
    }

    pub(crate) fn put_file(&mut self, path: &str, data: Vec<u8>, ccsid: u16, now: u64) {
        let path = normalize(path);
        let created = self.nodes.get(&path).map_or(now, |n| n.created);
        self.nodes.insert(path, Node { content: Content::File { data, ccsid }, created, modified: now });
    }

    pub(crate) fn file_data(&self, path: &str) -> Option<Vec<u8>> {
        match &self.nodes.get(&normalize(path))?.content {
            Content::File { data, .. } => Some(data.clone()),
            Content::Directory => None,
        }
    }

    fn entry(path: &str, node: &Node) -> FileEntry {
        let (object_type, size) = match &node.content {
            Content::File { data, .. } => (ObjectType::File, data.len() as u64),
            Content::Directory => (ObjectType::Directory, 0),
        };
        FileEntry {
            name: base_name(path).to_string(),
            object_type,
            size,
            created: node.created,
            modified: node.modified,
            attributes: 0,
        }
    }

    /// `dir/*` lists children; anything else matches one exact path.
    fn list(&self, pattern: &str) -> Result<Vec<FileEntry>, u16> {
        if let Some(dir) = pattern.strip_suffix("/*") {
            let dir = normalize(dir);
            if !self.is_dir(&dir) {
                return Err(if self.nodes.contains_key(&dir) { rc::INVALID_NAME } else { rc::PATH_NOT_FOUND });
            }
            return Ok(self
                .nodes
                .iter()
                .filter(|(path, _)| is_child_of(path, &dir))
                .map(|(path, node)| Self::entry(path, node))
                .collect());
        }
        let path = normalize(pattern);
        match self.nodes.get(&path) {
            Some(node) => Ok(vec![Self::entry(&path, node)]),
            None => Err(self.missing(&path)),
        }
    }

    fn delete_file(&mut self, path: &str) -> u16 {
        match self.nodes.get(path).map(|n| &n.content) {
            Some(Content::File { .. }) => {
                self.nodes.remove(path);
                rc::SUCCESS
            },
            Some(Content::Directory) => rc::ACCESS_DENIED,
            None => self.missing(path),
        }
    }

    fn create_dir(&mut self, path: &str, now: u64) -> u16 {
        if self.nodes.contains_key(path) {
            return rc::DUPLICATE_NAME;
        }
        match parent(path) {
            Some(dir) if self.is_dir(dir) => {
                self.nodes.insert(path.to_string(), Node { content: Content::Directory, created: now, modified: now });
                rc::SUCCESS
            },
            _ => rc::PATH_NOT_FOUND,
        }
    }

    fn delete_dir(&mut self, path: &str) -> u16 {
        if path == "/" {
            return rc::ACCESS_DENIED;
        }
        match self.nodes.get(path).map(|n| &n.content) {
            Some(Content::Directory) => {
                if self.nodes.keys().any(|p| is_child_of(p, path)) {
                    return rc::DIRECTORY_NOT_EMPTY;
                }
                self.nodes.remove(path);
                rc::SUCCESS
            },
            Some(Content::File { .. }) => rc::ACCESS_DENIED,
            None => self.missing(path),
        }
    }

    fn rename(&mut self, source: &str, target: &str, replace: bool) -> u16 {
        if !self.nodes.contains_key(source) {
            return self.missing(source);
        }
        if source == "/" || (target != source && is_within(target, source)) {
            return rc::INVALID_NAME;
        }
        if source == target {
            return rc::SUCCESS;
        }
        match parent(target) {
            Some(dir) if self.is_dir(dir) => {},
            _ => return rc::PATH_NOT_FOUND,
        }
        match self.nodes.get(target).map(|n| &n.content) {
            Some(_) if !replace => return rc::DUPLICATE_NAME,
            Some(Content::Directory) => return rc::ACCESS_DENIED,
            _ => {},
        }
        let moved: Vec<String> = self.nodes.keys().filter(|p| is_within(p, source)).cloned().collect();
        for old in moved {
            if let Some(node) = self.nodes.remove(&old) {
                let new = format!("{target}{}", &old[source.len()..]);
                self.nodes.insert(new, node);
            }
        }
        rc::SUCCESS
    }
}

fn return_code(code: u16) -> Result<Outcome, ProtocolError> {
    Outcome::one(ServerId::File, &ReturnCodeReply::new(code))
}

pub(crate) fn handle(state: &mut HostState, conn: &mut Conn, request: &DataStream) -> Result<Outcome, ProtocolError> {
    match request.request_id() {
        id::EXCHANGE_ATTRIBUTES => {
            let req = ExchangeAttributesRequest::parse(request)?;
            let ccsid = req
                .preferred_ccsids
                .iter()
                .copied()
                .find(|c| [CCSID_UTF16, CCSID_UCS2].contains(c))
                .unwrap_or(CCSID_UTF16);
            let reply = ExchangeAttributesReply {
                datastream_level: req.datastream_level.min(HOST_DATASTREAM_LEVEL),
                flags: 0,
                max_data_block: req.max_data_block.clamp(1, HOST_MAX_DATA_BLOCK),
                ccsid,
            };
            Outcome::one(ServerId::File, &reply)
        },
        id::LIST_ATTRIBUTES => {
            let req = ListAttributesRequest::parse(request)?;
            match state.fs.list(&req.pattern) {
                Ok(entries) => {
                    let mut replies = entries
                        .into_iter()
                        .take(usize::from(req.max_entries))
                        .map(|entry| DataStream::from_reply(ServerId::File, &ListEntryReply { chain: 1, entry }))
                        .collect::<Result<Vec<_>, _>>()?;
                    replies.push(DataStream::from_reply(ServerId::File, &ReturnCodeReply::new(rc::NO_MORE_FILES))?);
                    Ok(Outcome::Reply(replies))
                },
                Err(code) => return_code(code),
            }
        },
        id::OPEN => open(state, conn, &OpenRequest::parse(request)?),
        id::READ => {
            let req = ReadRequest::parse(request)?;
            let Some(handle) = conn.handles.get(&req.handle) else {
                return return_code(rc::INVALID_HANDLE);
            };
            if !handle.access.contains(AccessMode::READ) {
                return return_code(rc::ACCESS_DENIED);
            }
            let Some(Content::File { data, ccsid }) = state.fs.nodes.get(&handle.path).map(|n| &n.content) else {
                return return_code(rc::FILE_NOT_FOUND);
            };
            let start = usize::try_from(req.offset).unwrap_or(usize::MAX);
            if start >= data.len() {
                return return_code(rc::NO_MORE_DATA);
            }
            let length = req.length.min(HOST_MAX_DATA_BLOCK) as usize;
            let end = start.saturating_add(length).min(data.len());
            let reply = ReadReply { data_ccsid: *ccsid, data: data[start..end].to_vec().into() };
            Outcome::one(ServerId::File, &reply)
        },
        id::WRITE => {
            let req = WriteRequest::parse(request)?;
            let Some(handle) = conn.handles.get(&req.handle) else {
                return return_code(rc::INVALID_HANDLE);
            };
            if !handle.access.contains(AccessMode::WRITE) {
                return return_code(rc::ACCESS_DENIED);
            }
            if req.data.len() > HOST_MAX_DATA_BLOCK as usize {
                return return_code(rc::RESOURCE_LIMIT);
            }
            let now = state.tick();
            let Some(node) = state.fs.nodes.get_mut(&handle.path) else {
                return return_code(rc::FILE_NOT_FOUND);
            };
            let Content::File { data, .. } = &mut node.content else {
                return return_code(rc::ACCESS_DENIED);
            };
            let start = usize::try_from(req.offset).unwrap_or(usize::MAX);
            let end = start.saturating_add(req.data.len());
            if data.len() < end {
                data.resize(end, 0);
            }
            data[start..end].copy_from_slice(&req.data);
            node.modified = now;
            let written = u32::try_from(req.data.len()).unwrap_or(u32::MAX);
            Outcome::one(ServerId::File, &WriteReply { return_code: rc::SUCCESS, bytes_written: written })
        },
        id::CLOSE => {
            let req = CloseRequest::parse(request)?;
            let code = if conn.handles.remove(&req.handle).is_some() { rc::SUCCESS } else { rc::INVALID_HANDLE };
            return_code(code)
        },
        id::DELETE_FILE => {
            let req = DeleteFileRequest::parse(request)?;
            let path = normalize(&req.name);
            if conn.handles.values().any(|h| h.path == path) {
                return return_code(rc::FILE_IN_USE);
            }
            return_code(state.fs.delete_file(&path))
        },
        id::CREATE_DIRECTORY => {
            let req = CreateDirectoryRequest::parse(request)?;
            let now = state.tick();
            return_code(state.fs.create_dir(&normalize(&req.name), now))
        },
        id::DELETE_DIRECTORY => {
            let req = DeleteDirectoryRequest::parse(request)?;
            return_code(state.fs.delete_dir(&normalize(&req.name)))
        },
        id::RENAME => {
            let req = RenameRequest::parse(request)?;
            return_code(state.fs.rename(&normalize(&req.source), &normalize(&req.target), req.replace))
        },
        _ => return_code(rc::INVALID_REQUEST),
    }
}

fn open(state: &mut HostState, conn: &mut Conn, req: &OpenRequest) -> Result<Outcome, ProtocolError> {
    let path = normalize(&req.name);
    let now = state.tick();
    let exists = state.fs.nodes.contains_key(&path);
    if state.fs.is_dir(&path) {
        return return_code(rc::ACCESS_DENIED);
    }
    match (req.option, exists) {
        (OpenOption::OpenExisting, false) => return return_code(state.fs.missing(&path)),
        (OpenOption::CreateNew, true) => return return_code(rc::DUPLICATE_NAME),
        (OpenOption::CreateNew | OpenOption::CreateOrReplace, _) => {
            if !parent(&path).is_some_and(|dir| state.fs.is_dir(dir)) {
                return return_code(rc::PATH_NOT_FOUND);
            }
            state.fs.put_file(&path, Vec::new(), req.create_ccsid, now);
        },
        (OpenOption::OpenExisting, true) => {},
    }
    let Some(node) = state.fs.nodes.get(&path) else {
        return return_code(rc::FILE_NOT_FOUND);
    };
    let (size, data_ccsid) = match &node.content {
        Content::File { data, ccsid } => (data.len() as u64, *ccsid),
        Content::Directory => return return_code(rc::ACCESS_DENIED),
    };
    let handle = conn.next_handle;
    conn.next_handle += 1;
    conn.handles.insert(handle, OpenFile { path, access: req.access });
    Outcome::one(ServerId::File, &OpenReply { handle, data_ccsid, size, modified: node.modified })
}
