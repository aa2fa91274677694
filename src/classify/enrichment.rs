//! Enrichment capabilities consumed by the classifier
//!
//! Each OS-facing lookup sits behind a trait so classification can run
//! against fakes:
//! - CertificateLookup: code signing chain of an executable (`codesign`)
//! - QuarantineLookup: `com.apple.quarantine` attribute of a file (`xattr` crate)
//! - FileProbe: bounded text probing and reading
//! - PlistLookup: property list values and XML renderings (`plist` crate)
//!
//! Every lookup degrades to an empty answer on failure.

use log::debug;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex};

use crate::constants::{
    CERTIFICATE_CACHE_CAPACITY, MAX_CONTENT_BYTES, QUARANTINE_CACHE_CAPACITY, QUARANTINE_XATTR,
    TEXT_PROBE_BYTES,
};
use crate::error::{EsmError, EsmResult};
use crate::models::{QuarantineAwareness, QuarantineStatus, X509Cert};

const QUARANTINE_OPT_IN_KEY: &str = "LSFileQuarantineEnabled";

pub trait CertificateLookup: Send + Sync {
    /// Signing chain, leaf first; empty when unsigned or unreadable
    fn certificate_chain(&self, path: &str) -> Vec<X509Cert>;
}

pub trait QuarantineLookup: Send + Sync {
    fn quarantine_status(&self, path: &str) -> QuarantineStatus;
}

pub trait FileProbe: Send + Sync {
    /// Whether the first bytes of the file decode as UTF-8 text
    fn is_text(&self, path: &str) -> bool;

    /// Whole file as text, when it is text and within the size bound
    fn read_text(&self, path: &str) -> Option<String>;
}

pub trait PlistLookup: Send + Sync {
    /// Boolean value of a top-level key
    fn bool_value(&self, path: &Path, key: &str) -> Option<bool>;

    /// XML rendering of the property list, for binary and XML plists alike
    fn xml_text(&self, path: &Path) -> Option<String>;
}

/// Reads the signing chain from `codesign -dvvv` authority lines
#[derive(Debug, Clone, Copy, Default)]
pub struct CodesignCertificates;

impl CertificateLookup for CodesignCertificates {
    fn certificate_chain(&self, path: &str) -> Vec<X509Cert> {
        let output = match Command::new("codesign").arg("-dvvv").arg(path).output() {
            Ok(output) => output,
            Err(e) => {
                debug!("codesign unavailable for {}: {}", path, e);
                return Vec::new();
            }
        };

        if !output.status.success() {
            return Vec::new();
        }

        // codesign writes its display output to stderr
        parse_authorities(&String::from_utf8_lossy(&output.stderr))
    }
}

/// Extract `Authority=` lines, in chain order
pub fn parse_authorities(display: &str) -> Vec<X509Cert> {
    display
        .lines()
        .filter_map(|line| line.trim().strip_prefix("Authority="))
        .filter(|summary| !summary.is_empty())
        .map(|summary| X509Cert {
            summary: summary.to_string(),
            thumbprint: None,
        })
        .collect()
}

/// Reads the quarantine attribute in-process with `getxattr`
#[derive(Debug, Clone, Copy, Default)]
pub struct XattrQuarantine;

impl QuarantineLookup for XattrQuarantine {
    fn quarantine_status(&self, path: &str) -> QuarantineStatus {
        match xattr::get(path, QUARANTINE_XATTR) {
            Ok(Some(value)) if !value.is_empty() => QuarantineStatus::Quarantined,
            Ok(_) => QuarantineStatus::NotQuarantined,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => QuarantineStatus::NotFound,
            Err(e) => {
                debug!("Quarantine attribute unreadable for {}: {}", path, e);
                if Path::new(path).exists() {
                    QuarantineStatus::NotQuarantined
                } else {
                    QuarantineStatus::NotFound
                }
            }
        }
    }
}

/// File system backed probe
#[derive(Debug, Clone, Copy, Default)]
pub struct FsProbe;

impl FileProbe for FsProbe {
    fn is_text(&self, path: &str) -> bool {
        let Ok(file) = fs::File::open(strip_file_scheme(path)) else {
            return false;
        };
        let mut head = Vec::with_capacity(TEXT_PROBE_BYTES);
        if file.take(TEXT_PROBE_BYTES as u64).read_to_end(&mut head).is_err() {
            return false;
        }
        looks_like_text(&head)
    }

    fn read_text(&self, path: &str) -> Option<String> {
        let path = strip_file_scheme(path);
        let metadata = fs::metadata(path).ok()?;
        if !metadata.is_file() || metadata.len() > MAX_CONTENT_BYTES {
            debug!("Skipping content of {} ({} bytes)", path, metadata.len());
            return None;
        }
        if !self.is_text(path) {
            return None;
        }
        fs::read_to_string(path).ok()
    }
}

fn strip_file_scheme(path: &str) -> &str {
    path.strip_prefix("file://").unwrap_or(path)
}

/// UTF-8 check that tolerates a multi-byte character cut at the probe boundary
pub fn looks_like_text(head: &[u8]) -> bool {
    match std::str::from_utf8(head) {
        Ok(_) => true,
        Err(e) => e.error_len().is_none() && head.len() - e.valid_up_to() < 4,
    }
}

/// Property list access through the `plist` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct PlistFiles;

impl PlistLookup for PlistFiles {
    fn bool_value(&self, path: &Path, key: &str) -> Option<bool> {
        let value = plist::Value::from_file(path).ok()?;
        value.as_dictionary()?.get(key)?.as_boolean()
    }

    fn xml_text(&self, path: &Path) -> Option<String> {
        let metadata = fs::metadata(path).ok()?;
        if metadata.len() > MAX_CONTENT_BYTES {
            return None;
        }
        let value = plist::Value::from_file(path).ok()?;
        let mut xml = Vec::new();
        value.to_writer_xml(&mut xml).ok()?;
        String::from_utf8(xml).ok()
    }
}

/// Lookups that never find anything, for disabled enrichment
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLookup;

impl CertificateLookup for NoLookup {
    fn certificate_chain(&self, _path: &str) -> Vec<X509Cert> {
        Vec::new()
    }
}

impl QuarantineLookup for NoLookup {
    fn quarantine_status(&self, _path: &str) -> QuarantineStatus {
        QuarantineStatus::NotFound
    }
}

impl FileProbe for NoLookup {
    fn is_text(&self, _path: &str) -> bool {
        false
    }

    fn read_text(&self, _path: &str) -> Option<String> {
        None
    }
}

impl PlistLookup for NoLookup {
    fn bool_value(&self, _path: &Path, _key: &str) -> Option<bool> {
        None
    }

    fn xml_text(&self, _path: &Path) -> Option<String> {
        None
    }
}

/// Load the signing identifiers Apple forces into File Quarantine.
///
/// These are the keys of the `Additions` dictionary whose entry carries an
/// `LSFileQuarantineEnabled` key.
pub fn load_forced_quarantine(path: &Path) -> EsmResult<HashSet<String>> {
    let value = plist::Value::from_file(path).map_err(|e| EsmError::Io {
        path: path.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
    })?;

    let additions = value
        .as_dictionary()
        .and_then(|root| root.get("Additions"))
        .and_then(|additions| additions.as_dictionary());

    Ok(additions
        .map(|entries| {
            entries
                .iter()
                .filter(|(_, entry)| {
                    entry
                        .as_dictionary()
                        .is_some_and(|dict| dict.contains_key(QUARANTINE_OPT_IN_KEY))
                })
                .map(|(id, _)| id.clone())
                .collect()
        })
        .unwrap_or_default())
}

/// Bounded path keyed cache; the oldest entry is evicted first
#[derive(Debug)]
pub struct BoundedCache<V> {
    capacity: usize,
    inner: Mutex<CacheInner<V>>,
}

#[derive(Debug)]
struct CacheInner<V> {
    entries: HashMap<String, V>,
    order: VecDeque<String>,
}

/// Bundle path -> File Quarantine opt-in
pub type QuarantineCache = BoundedCache<bool>;

/// Executable path -> signing chain
pub type CertificateCache = BoundedCache<Vec<X509Cert>>;

impl<V: Clone> BoundedCache<V> {
    pub fn new(capacity: usize) -> Self {
        BoundedCache {
            capacity: capacity.max(1),
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    pub fn get(&self, path: &str) -> Option<V> {
        self.lock().entries.get(path).cloned()
    }

    pub fn insert(&self, path: &str, value: V) {
        let mut inner = self.lock();
        if let Some(existing) = inner.entries.get_mut(path) {
            *existing = value;
            return;
        }
        while inner.entries.len() >= self.capacity {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            inner.entries.remove(&oldest);
        }
        inner.entries.insert(path.to_string(), value);
        inner.order.push_back(path.to_string());
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheInner<V>> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for QuarantineCache {
    fn default() -> Self {
        Self::new(QUARANTINE_CACHE_CAPACITY)
    }
}

impl Default for CertificateCache {
    fn default() -> Self {
        Self::new(CERTIFICATE_CACHE_CAPACITY)
    }
}

/// `Contents/Info.plist` of the bundle containing `path`
pub fn bundle_info_plist(path: &str) -> Option<PathBuf> {
    let mut bundle = PathBuf::new();
    for component in Path::new(path).components() {
        bundle.push(component.as_os_str());
        if component == Component::Normal("Contents".as_ref()) {
            return Some(bundle.join("Info.plist"));
        }
    }
    None
}

/// Everything the classifier may consult while translating
#[derive(Clone)]
pub struct Enrichment {
    pub certificates: Arc<dyn CertificateLookup>,
    pub quarantine: Arc<dyn QuarantineLookup>,
    pub files: Arc<dyn FileProbe>,
    pub plists: Arc<dyn PlistLookup>,
    /// Read script bodies for whitelisted interpreters
    pub script_content: bool,
    forced_quarantine: Arc<HashSet<String>>,
    quarantine_cache: Arc<QuarantineCache>,
    certificate_cache: Arc<CertificateCache>,
}

impl std::fmt::Debug for Enrichment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Enrichment")
            .field("script_content", &self.script_content)
            .field("forced_quarantine", &self.forced_quarantine.len())
            .field("quarantine_cache", &self.quarantine_cache.len())
            .field("certificate_cache", &self.certificate_cache.len())
            .finish()
    }
}

impl Enrichment {
    pub fn new(
        certificates: Arc<dyn CertificateLookup>,
        quarantine: Arc<dyn QuarantineLookup>,
        files: Arc<dyn FileProbe>,
        plists: Arc<dyn PlistLookup>,
    ) -> Self {
        Enrichment {
            certificates,
            quarantine,
            files,
            plists,
            script_content: true,
            forced_quarantine: Arc::new(HashSet::new()),
            quarantine_cache: Arc::new(QuarantineCache::default()),
            certificate_cache: Arc::new(CertificateCache::default()),
        }
    }

    /// OS backed lookups
    pub fn system() -> Self {
        Self::new(
            Arc::new(CodesignCertificates),
            Arc::new(XattrQuarantine),
            Arc::new(FsProbe),
            Arc::new(PlistFiles),
        )
    }

    /// No lookups at all
    pub fn disabled() -> Self {
        let none = Arc::new(NoLookup);
        let mut enrichment = Self::new(none.clone(), none.clone(), none.clone(), none);
        enrichment.script_content = false;
        enrichment
    }

    pub fn with_forced_quarantine(mut self, ids: HashSet<String>) -> Self {
        self.forced_quarantine = Arc::new(ids);
        self
    }

    pub fn with_script_content(mut self, enabled: bool) -> Self {
        self.script_content = enabled;
        self
    }

    pub fn quarantine_cache(&self) -> &QuarantineCache {
        &self.quarantine_cache
    }

    pub fn certificate_cache(&self) -> &CertificateCache {
        &self.certificate_cache
    }

    /// Signing chain of an executable, looked up once per path
    pub fn certificate_chain(&self, path: &str) -> Vec<X509Cert> {
        if let Some(chain) = self.certificate_cache.get(path) {
            return chain;
        }
        let chain = self.certificates.certificate_chain(path);
        self.certificate_cache.insert(path, chain.clone());
        chain
    }

    /// File Quarantine participation of an executable.
    ///
    /// Non-bundle executables are disabled, forced signing identifiers win,
    /// otherwise the bundle's Info.plist decides and the answer is cached.
    pub fn quarantine_awareness(&self, path: &str, signing_id: Option<&str>) -> QuarantineAwareness {
        if !path.contains(".app") {
            return QuarantineAwareness::Disabled;
        }

        if signing_id.is_some_and(|id| self.forced_quarantine.contains(id)) {
            return QuarantineAwareness::Forced;
        }

        if let Some(opt_in) = self.quarantine_cache.get(path) {
            return awareness(opt_in);
        }

        let opt_in = bundle_info_plist(path)
            .and_then(|info| self.plists.bool_value(&info, QUARANTINE_OPT_IN_KEY))
            .unwrap_or(false);
        self.quarantine_cache.insert(path, opt_in);
        awareness(opt_in)
    }
}

fn awareness(opt_in: bool) -> QuarantineAwareness {
    if opt_in {
        QuarantineAwareness::OptIn
    } else {
        QuarantineAwareness::Disabled
    }
}
