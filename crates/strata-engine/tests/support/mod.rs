#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tempfile::TempDir;

use strata_core::CancelFlag;
use strata_engine::{
    Cancelled, DumbModePolicy, IndexExtension, IndexHost, IndexKey, IndexService,
    IndexServiceBuilder, IndexingConfig, PathPrefixSet,
};
use strata_storage::{
    DataExternalizer, StringExternalizer, U32Externalizer, UnitExternalizer,
};
use strata_vfs::{DocumentStore, FileContent, FileMeta, FileTree, MemoryVfs, VfsListener};

pub const WORDS: IndexKey<String, u32> = IndexKey::new("word.count");
pub const EXTENSIONS: IndexKey<String, ()> = IndexKey::new("file.extension");

/// Counts occurrences of each whitespace-separated word.
pub struct WordIndex {
    version: u32,
    pub calls: AtomicUsize,
}

impl WordIndex {
    pub fn new(version: u32) -> Arc<Self> {
        Arc::new(Self {
            version,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl IndexExtension<String, u32> for WordIndex {
    fn name(&self) -> &str {
        WORDS.name()
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn index(&self, content: &FileContent) -> HashMap<String, u32> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut out: HashMap<String, u32> = HashMap::new();
        for word in content.text().split_whitespace() {
            *out.entry(word.to_string()).or_default() += 1;
        }
        out
    }

    fn key_externalizer(&self) -> Arc<dyn DataExternalizer<String>> {
        Arc::new(StringExternalizer)
    }

    fn value_externalizer(&self) -> Arc<dyn DataExternalizer<u32>> {
        Arc::new(U32Externalizer)
    }

    fn accept_input(&self, file: &FileMeta) -> bool {
        !file.is_directory
    }
}

/// Content-less index: file extension → the files carrying it.
pub struct ExtensionIndex;

impl IndexExtension<String, ()> for ExtensionIndex {
    fn name(&self) -> &str {
        EXTENSIONS.name()
    }

    fn version(&self) -> u32 {
        1
    }

    fn index(&self, content: &FileContent) -> HashMap<String, ()> {
        let mut out = HashMap::new();
        if let Some(ext) = content.path().extension().and_then(|e| e.to_str()) {
            out.insert(ext.to_string(), ());
        }
        out
    }

    fn key_externalizer(&self) -> Arc<dyn DataExternalizer<String>> {
        Arc::new(StringExternalizer)
    }

    fn value_externalizer(&self) -> Arc<dyn DataExternalizer<()>> {
        Arc::new(UnitExternalizer)
    }

    fn accept_input(&self, file: &FileMeta) -> bool {
        !file.is_directory
    }

    fn depends_on_file_content(&self) -> bool {
        false
    }
}

#[derive(Default)]
pub struct RecordingHost {
    pub notifications: Mutex<Vec<String>>,
    pub dumb: AtomicBool,
    pub cancel: CancelFlag,
}

impl RecordingHost {
    pub fn notifications(&self) -> Vec<String> {
        self.notifications.lock().clone()
    }
}

impl IndexHost for RecordingHost {
    fn is_dumb(&self) -> bool {
        self.dumb.load(Ordering::SeqCst)
    }

    fn dumb_mode_policy(&self) -> DumbModePolicy {
        DumbModePolicy::Fail
    }

    fn check_canceled(&self) -> Result<(), Cancelled> {
        self.cancel.check()
    }

    fn notify_rebuild(&self, message: &str) {
        self.notifications.lock().push(message.to_string());
    }
}

pub struct Env {
    pub vfs: Arc<MemoryVfs>,
    pub dir: TempDir,
}

pub fn env() -> Env {
    Env {
        vfs: MemoryVfs::new(),
        dir: tempfile::tempdir().unwrap(),
    }
}

impl Env {
    pub fn root(&self) -> &Path {
        self.dir.path()
    }
}

/// One running service over an [`Env`]; dropping it shuts the service down.
pub struct Stack {
    pub service: Arc<IndexService>,
    pub words: Arc<WordIndex>,
    pub host: Arc<RecordingHost>,
    listener: Arc<dyn VfsListener>,
}

pub fn start(env: &Env, words_version: u32) -> Stack {
    let host = Arc::new(RecordingHost::default());
    let words = WordIndex::new(words_version);
    let config = IndexingConfig {
        flush_daemon: false,
        ..IndexingConfig::default()
    };

    let service = IndexServiceBuilder::new(
        env.root(),
        env.vfs.clone() as Arc<dyn FileTree>,
        env.vfs.clone() as Arc<dyn DocumentStore>,
    )
    .with_host(host.clone())
    .with_config(config)
    .add_extension::<String, u32>(words.clone())
    .add_extension::<String, ()>(Arc::new(ExtensionIndex))
    .build()
    .unwrap();

    let listener = service.vfs_listener();
    env.vfs.add_listener(&listener);
    service.register_indexable_set(Arc::new(PathPrefixSet::new("/")), None);

    Stack {
        service,
        words,
        host,
        listener,
    }
}
