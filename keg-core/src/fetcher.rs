//! The fetch planner
//!
//! A [`Fetcher`] walks the reference graph rooted at one version record
//! (build config → CDN config → patch config → encoding → archives → loose
//! files → patches) and emits a staged sequence of [`Drain`]s. Each drain
//! holds one [`Directive`] per key that is still missing locally, in sorted
//! key order; the caller services them (in any order, concurrently if it
//! likes) and asks for the next drain. Metadata parses (configs, the
//! encoding table, the archive group) happen between drains, never inside
//! one.

use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info, warn};

use futures_util::{StreamExt, TryStreamExt, stream};
use keg_cdn::{LocalCdn, RemoteCdn, paths, verify_data};
use keg_crypto::ArmadilloKey;
use keg_formats::{ArchiveGroup, BuildConfig, CdnConfig, EncodingTable, PatchConfig};
use keg_remote::Versions;

use crate::Result;

/// The three successive planner phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Config,
    Metadata,
    Data,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config => write!(f, "config"),
            Self::Metadata => write!(f, "metadata"),
            Self::Data => write!(f, "data"),
        }
    }
}

/// What kind of object a directive fetches: where it lives, how it is
/// verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveKind {
    ProductConfig,
    Config,
    DataIndex,
    PatchIndex,
    Archive,
    LooseFile,
    SignatureFile,
    PatchEntry,
    PatchArchive,
}

impl DirectiveKind {
    /// Object-relative path for a key of this kind.
    pub fn item_path(self, key: &str) -> Result<String> {
        Ok(match self {
            Self::ProductConfig => paths::config_item_path(key)?,
            Self::Config => paths::config_path(key)?,
            Self::DataIndex => paths::data_index_path(key)?,
            Self::PatchIndex => paths::patch_index_path(key)?,
            Self::Archive | Self::LooseFile | Self::SignatureFile => paths::data_path(key)?,
            Self::PatchEntry | Self::PatchArchive => paths::patch_path(key)?,
        })
    }

    /// Whether the object is already present locally.
    pub fn exists(self, key: &str, local: &LocalCdn) -> Result<bool> {
        Ok(local.exists(&self.item_path(key)?))
    }
}

/// One unit of fetch work: a key plus how to treat it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub key: String,
    pub kind: DirectiveKind,
}

/// A named batch of directives for keys that were missing when the drain
/// was created. Keys are strictly increasing lexicographically.
#[derive(Debug)]
pub struct Drain {
    pub name: &'static str,
    pub phase: Phase,
    pub directives: Vec<Directive>,
}

impl Drain {
    pub fn len(&self) -> usize {
        self.directives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }
}

/// Insertion-deduplicated, sorted key queue.
#[derive(Debug, Default)]
struct FetchQueue {
    keys: BTreeSet<String>,
}

impl FetchQueue {
    fn add(&mut self, key: &str) {
        if !key.is_empty() {
            self.keys.insert(key.to_string());
        }
    }

    fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Consume the queue into directives for keys missing locally.
    fn drain_missing(&mut self, kind: DirectiveKind, local: &LocalCdn) -> Result<Vec<Directive>> {
        let mut directives = Vec::new();
        for key in std::mem::take(&mut self.keys) {
            if !kind.exists(&key, local)? {
                directives.push(Directive { key, kind });
            }
        }
        Ok(directives)
    }
}

/// Planner steps, in emission order. Each step owns at most one drain; the
/// side effects of a serviced drain run when the planner advances past it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    ProductConfig,
    Config,
    PatchConfig,
    Encoding,
    Download,
    SizeFile,
    Signature,
    Indices,
    PatchIndices,
    Archives,
    LooseFiles,
    PatchEntries,
    PatchArchives,
    Done,
}

/// The stateful fetch planner for one version of one remote.
pub struct Fetcher<'a> {
    version: Versions,
    local_cdn: &'a LocalCdn,
    remote_cdn: &'a RemoteCdn,
    verify: bool,

    product_config_queue: FetchQueue,
    config_queue: FetchQueue,
    index_queue: FetchQueue,
    patch_index_queue: FetchQueue,
    archive_queue: FetchQueue,
    loose_file_queue: FetchQueue,
    signature_file_queue: FetchQueue,
    patch_entry_queue: FetchQueue,
    patch_archive_queue: FetchQueue,

    pub build_config: Option<BuildConfig>,
    pub cdn_config: Option<CdnConfig>,
    pub patch_config: Option<PatchConfig>,
    pub encoding: Option<EncodingTable>,
    pub product_config: Option<serde_json::Value>,

    decryption_key_name: String,
    decryption_key: Option<ArmadilloKey>,

    step: Step,
    emitted: Option<Step>,
}

impl<'a> Fetcher<'a> {
    pub fn new(
        version: Versions,
        local_cdn: &'a LocalCdn,
        remote_cdn: &'a RemoteCdn,
        verify: bool,
    ) -> Self {
        Self {
            version,
            local_cdn,
            remote_cdn,
            verify,
            product_config_queue: FetchQueue::default(),
            config_queue: FetchQueue::default(),
            index_queue: FetchQueue::default(),
            patch_index_queue: FetchQueue::default(),
            archive_queue: FetchQueue::default(),
            loose_file_queue: FetchQueue::default(),
            signature_file_queue: FetchQueue::default(),
            patch_entry_queue: FetchQueue::default(),
            patch_archive_queue: FetchQueue::default(),
            build_config: None,
            cdn_config: None,
            patch_config: None,
            encoding: None,
            product_config: None,
            decryption_key_name: String::new(),
            decryption_key: None,
            step: Step::ProductConfig,
            emitted: None,
        }
    }

    pub fn version(&self) -> &Versions {
        &self.version
    }

    /// The Armadillo key name the product config declared, if any.
    pub fn decryption_key_name(&self) -> &str {
        &self.decryption_key_name
    }

    /// Produce the next drain, or `None` once every phase has run.
    ///
    /// Advancing first completes the deferred side effects of the drain the
    /// caller just serviced (config parses, encoding-table load, archive
    /// group build).
    pub fn next_drain(&mut self) -> Result<Option<Drain>> {
        if let Some(emitted) = self.emitted.take() {
            self.after_drain(emitted)?;
        }

        loop {
            match self.step {
                Step::ProductConfig => {
                    self.step = Step::Config;
                    self.product_config_queue.add(&self.version.product_config.clone());
                    self.emitted = Some(Step::ProductConfig);
                    let directives = self
                        .product_config_queue
                        .drain_missing(DirectiveKind::ProductConfig, self.local_cdn)?;
                    return Ok(Some(Drain {
                        name: "product config",
                        phase: Phase::Config,
                        directives,
                    }));
                }

                Step::Config => {
                    self.step = Step::PatchConfig;
                    self.config_queue.add(&self.version.build_config.clone());
                    self.config_queue.add(&self.version.cdn_config.clone());
                    self.emitted = Some(Step::Config);
                    let directives = self
                        .config_queue
                        .drain_missing(DirectiveKind::Config, self.local_cdn)?;
                    return Ok(Some(Drain {
                        name: "config items",
                        phase: Phase::Config,
                        directives,
                    }));
                }

                Step::PatchConfig => {
                    self.step = Step::Encoding;
                    let patch_config_key = self
                        .build_config
                        .as_ref()
                        .map(|bc| bc.patch_config.clone())
                        .unwrap_or_default();
                    if patch_config_key.is_empty() {
                        continue;
                    }
                    self.config_queue.add(&patch_config_key);
                    self.emitted = Some(Step::PatchConfig);
                    let directives = self
                        .config_queue
                        .drain_missing(DirectiveKind::Config, self.local_cdn)?;
                    return Ok(Some(Drain {
                        name: "patch config",
                        phase: Phase::Config,
                        directives,
                    }));
                }

                Step::Encoding => {
                    self.populate_metadata_queues();
                    self.step = Step::Download;
                    let ekey = self.encoding_ekey();
                    if ekey.is_empty() {
                        continue;
                    }
                    self.loose_file_queue.add(&ekey);
                    self.emitted = Some(Step::Encoding);
                    let directives = self
                        .loose_file_queue
                        .drain_missing(DirectiveKind::LooseFile, self.local_cdn)?;
                    return Ok(Some(Drain {
                        name: "encoding table",
                        phase: Phase::Metadata,
                        directives,
                    }));
                }

                Step::Download => {
                    self.step = Step::SizeFile;
                    let ekey = self
                        .build_config
                        .as_ref()
                        .map(|bc| bc.download.encoding_key.clone())
                        .unwrap_or_default();
                    if ekey.is_empty() {
                        continue;
                    }
                    self.loose_file_queue.add(&ekey);
                    self.emitted = Some(Step::Download);
                    let directives = self
                        .loose_file_queue
                        .drain_missing(DirectiveKind::LooseFile, self.local_cdn)?;
                    return Ok(Some(Drain {
                        name: "download manifest",
                        phase: Phase::Metadata,
                        directives,
                    }));
                }

                Step::SizeFile => {
                    self.step = Step::Signature;
                    let ekey = self
                        .build_config
                        .as_ref()
                        .map(|bc| bc.size.encoding_key.clone())
                        .unwrap_or_default();
                    if ekey.is_empty() {
                        continue;
                    }
                    self.loose_file_queue.add(&ekey);
                    self.emitted = Some(Step::SizeFile);
                    let directives = self
                        .loose_file_queue
                        .drain_missing(DirectiveKind::LooseFile, self.local_cdn)?;
                    return Ok(Some(Drain {
                        name: "size file",
                        phase: Phase::Metadata,
                        directives,
                    }));
                }

                Step::Signature => {
                    self.step = Step::Indices;
                    let key = self
                        .build_config
                        .as_ref()
                        .map(|bc| bc.build_signature_file.clone())
                        .unwrap_or_default();
                    if key.is_empty() {
                        continue;
                    }
                    self.signature_file_queue.add(&key);
                    self.emitted = Some(Step::Signature);
                    let directives = self
                        .signature_file_queue
                        .drain_missing(DirectiveKind::SignatureFile, self.local_cdn)?;
                    return Ok(Some(Drain {
                        name: "signature file",
                        phase: Phase::Metadata,
                        directives,
                    }));
                }

                Step::Indices => {
                    self.step = Step::PatchIndices;
                    if self.index_queue.is_empty() {
                        continue;
                    }
                    self.emitted = Some(Step::Indices);
                    let directives = self
                        .index_queue
                        .drain_missing(DirectiveKind::DataIndex, self.local_cdn)?;
                    return Ok(Some(Drain {
                        name: "archive indices",
                        phase: Phase::Metadata,
                        directives,
                    }));
                }

                Step::PatchIndices => {
                    self.step = Step::Archives;
                    if self.patch_index_queue.is_empty() {
                        continue;
                    }
                    self.emitted = Some(Step::PatchIndices);
                    let directives = self
                        .patch_index_queue
                        .drain_missing(DirectiveKind::PatchIndex, self.local_cdn)?;
                    return Ok(Some(Drain {
                        name: "patch indices",
                        phase: Phase::Metadata,
                        directives,
                    }));
                }

                Step::Archives => {
                    self.enqueue_unarchived_loose_files()?;
                    self.step = Step::LooseFiles;
                    self.emitted = Some(Step::Archives);
                    let directives = self
                        .archive_queue
                        .drain_missing(DirectiveKind::Archive, self.local_cdn)?;
                    return Ok(Some(Drain {
                        name: "archives",
                        phase: Phase::Data,
                        directives,
                    }));
                }

                Step::LooseFiles => {
                    self.step = Step::PatchEntries;
                    self.emitted = Some(Step::LooseFiles);
                    let directives = self
                        .loose_file_queue
                        .drain_missing(DirectiveKind::LooseFile, self.local_cdn)?;
                    return Ok(Some(Drain {
                        name: "loose files",
                        phase: Phase::Data,
                        directives,
                    }));
                }

                Step::PatchEntries => {
                    self.step = Step::PatchArchives;
                    self.emitted = Some(Step::PatchEntries);
                    let directives = self
                        .patch_entry_queue
                        .drain_missing(DirectiveKind::PatchEntry, self.local_cdn)?;
                    return Ok(Some(Drain {
                        name: "patch entries",
                        phase: Phase::Data,
                        directives,
                    }));
                }

                Step::PatchArchives => {
                    self.step = Step::Done;
                    self.emitted = Some(Step::PatchArchives);
                    let directives = self
                        .patch_archive_queue
                        .drain_missing(DirectiveKind::PatchArchive, self.local_cdn)?;
                    return Ok(Some(Drain {
                        name: "patch archives",
                        phase: Phase::Data,
                        directives,
                    }));
                }

                Step::Done => return Ok(None),
            }
        }
    }

    /// Deferred side effects, keyed by the drain the caller just finished.
    fn after_drain(&mut self, emitted: Step) -> Result<()> {
        match emitted {
            Step::ProductConfig => {
                let key = self.version.product_config.clone();
                if !key.is_empty() && self.local_cdn.has_config_item(&key)? {
                    self.product_config = Some(self.local_cdn.get_product_config(&key)?);
                }

                if let Some(config) = &self.product_config {
                    let key_name = config
                        .pointer("/all/config/decryption_key_name")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string();
                    if !key_name.is_empty() {
                        self.decryption_key_name = key_name;
                        match self.local_cdn.get_decryption_key(&self.decryption_key_name) {
                            Ok(key) => self.decryption_key = Some(key),
                            Err(keg_cdn::Error::ArmadilloKeyNotFound { name }) => {
                                // Tolerated: encrypted objects go to the
                                // quarantine until the key turns up.
                                warn!("no armadillo key {name:?}; fetches will quarantine");
                                self.decryption_key = None;
                            }
                            Err(e) => return Err(e.into()),
                        }
                    }
                }
            }

            Step::Config => {
                if self.local_cdn.has_config(&self.version.build_config)? {
                    self.build_config = Some(
                        self.local_cdn
                            .get_build_config(&self.version.build_config, self.verify)?,
                    );
                }
                if self.local_cdn.has_config(&self.version.cdn_config)? {
                    self.cdn_config = Some(
                        self.local_cdn
                            .get_cdn_config(&self.version.cdn_config, self.verify)?,
                    );
                }
            }

            Step::PatchConfig => {
                let key = self
                    .build_config
                    .as_ref()
                    .map(|bc| bc.patch_config.clone())
                    .unwrap_or_default();
                if !key.is_empty() && self.local_cdn.has_config(&key)? {
                    self.patch_config =
                        Some(self.local_cdn.get_patch_config(&key, self.verify)?);
                }
            }

            Step::Encoding => {
                let ekey = self.encoding_ekey();
                if !ekey.is_empty() && self.local_cdn.has_data(&ekey)? {
                    let data = self.local_cdn.download_blte_data(&ekey, self.verify)?;
                    let ckey = self
                        .build_config
                        .as_ref()
                        .map(|bc| bc.encoding.content_key.clone())
                        .unwrap_or_default();
                    self.encoding = Some(EncodingTable::parse(&data, &ckey, self.verify)?);
                    debug!("parsed encoding table for {ekey}");
                }
            }

            _ => {}
        }
        Ok(())
    }

    fn encoding_ekey(&self) -> String {
        self.build_config
            .as_ref()
            .map(|bc| bc.encoding.encoding_key.clone())
            .unwrap_or_default()
    }

    /// Seed the metadata queues once both configs are parsed.
    fn populate_metadata_queues(&mut self) {
        let (archives, file_index, patch_archives, patch_file_index) = match &self.cdn_config {
            Some(cdn_config) => (
                cdn_config.archives.clone(),
                cdn_config.file_index.clone(),
                cdn_config.patch_archives.clone(),
                cdn_config.patch_file_index.clone(),
            ),
            None => Default::default(),
        };

        for archive_key in &archives {
            self.archive_queue.add(archive_key);
            self.index_queue.add(archive_key);
        }
        self.index_queue.add(&file_index);

        for patch_archive_key in &patch_archives {
            self.patch_archive_queue.add(patch_archive_key);
            self.patch_index_queue.add(patch_archive_key);
        }
        self.patch_index_queue.add(&patch_file_index);

        let patch_keys: Vec<String> = self
            .patch_config
            .as_ref()
            .map(|patch_config| {
                patch_config
                    .patch_entries
                    .iter()
                    .flat_map(|entry| entry.pairs.iter().map(|pair| pair.patch_key.clone()))
                    .collect()
            })
            .unwrap_or_default();
        for patch_key in &patch_keys {
            self.patch_entry_queue.add(patch_key);
        }
    }

    /// Everything the encoding table names that no archive covers gets
    /// fetched loose.
    fn enqueue_unarchived_loose_files(&mut self) -> Result<()> {
        let Some(cdn_config) = &self.cdn_config else {
            return Ok(());
        };
        let Some(encoding) = &self.encoding else {
            return Ok(());
        };

        let mut indices = Vec::with_capacity(cdn_config.archives.len());
        for archive_key in &cdn_config.archives {
            if self.local_cdn.has_index(archive_key)? {
                indices.push(self.local_cdn.get_data_index(archive_key, self.verify)?);
            }
        }
        let group = ArchiveGroup::build(
            cdn_config.archives.clone(),
            &cdn_config.archive_group,
            &indices,
        );

        let missing: Vec<String> = encoding
            .encoding_entries()
            .filter(|(ekey, _)| !group.has_file(ekey))
            .map(|(ekey, _)| ekey)
            .collect();

        if !missing.is_empty() {
            info!("{} encoded files not covered by any archive", missing.len());
        }
        for ekey in &missing {
            self.loose_file_queue.add(ekey);
        }
        Ok(())
    }

    /// Service one directive: stream the object, verify it, publish it.
    ///
    /// Already-present objects return immediately; with an active
    /// decryption-key name and no loaded key, encrypted objects land in the
    /// quarantine instead of the store.
    pub async fn fetch(&self, directive: &Directive) -> Result<()> {
        let rel = directive.kind.item_path(&directive.key)?;
        if self.local_cdn.exists(&rel) {
            return Ok(());
        }

        if directive.kind == DirectiveKind::ProductConfig {
            let data = self.remote_cdn.get_config_item(&directive.key).await?;
            self.local_cdn.save_config_item(&directive.key, &data)?;
            return Ok(());
        }

        let item_path = format!("/{rel}");

        if !self.decryption_key_name.is_empty() {
            let data = self.remote_cdn.get_item_bytes(&item_path).await?;

            let Some(key) = &self.decryption_key else {
                if !self.local_cdn.has_fragment(&rel) {
                    self.local_cdn.write_fragment(&rel, &data)?;
                }
                return Ok(());
            };

            let decrypted = key.decrypt_object(&directive.key, &data)?;
            let temp = self.local_cdn.write_temp_file(&decrypted)?;
            return self.verify_and_promote(directive, &rel, &temp);
        }

        let temp = self.local_cdn.create_temp_file()?;
        match self.remote_cdn.download_to(&item_path, &temp).await {
            Ok(_) => self.verify_and_promote(directive, &rel, &temp),
            Err(e) => {
                self.local_cdn.discard_temp_file(&temp);
                Err(e.into())
            }
        }
    }

    fn verify_and_promote(&self, directive: &Directive, rel: &str, temp: &Path) -> Result<()> {
        if self.verify {
            if let Err(e) = self.verify_directive(directive, temp) {
                self.local_cdn.discard_temp_file(temp);
                return Err(e);
            }
        }
        self.local_cdn.promote_temp_file(temp, rel)?;
        Ok(())
    }

    fn verify_directive(&self, directive: &Directive, temp: &Path) -> Result<()> {
        match directive.kind {
            DirectiveKind::Config
            | DirectiveKind::PatchEntry
            | DirectiveKind::SignatureFile => {
                let data = std::fs::read(temp)?;
                verify_data("fetched object", &data, &directive.key)?;
            }

            DirectiveKind::DataIndex | DirectiveKind::PatchIndex => {
                let data = std::fs::read(temp)?;
                if data.len() < 28 {
                    return Err(keg_formats::Error::TruncatedIndex(data.len()).into());
                }
                verify_data("index footer", &data[data.len() - 28..], &directive.key)?;
            }

            DirectiveKind::LooseFile => {
                let f = std::fs::File::open(temp)?;
                keg_blte::verify_stream(f, &directive.key)?;
            }

            DirectiveKind::Archive => {
                // An archive is only usable through its index.
                if !DirectiveKind::DataIndex.exists(&directive.key, self.local_cdn)? {
                    return Err(keg_cdn::Error::FileNotFound {
                        path: format!("no index file for archive {}", directive.key),
                    }
                    .into());
                }
            }

            DirectiveKind::PatchArchive => {
                if !DirectiveKind::PatchIndex.exists(&directive.key, self.local_cdn)? {
                    return Err(keg_cdn::Error::FileNotFound {
                        path: format!("no index file for patch archive {}", directive.key),
                    }
                    .into());
                }
            }

            DirectiveKind::ProductConfig => {}
        }
        Ok(())
    }

    /// Walk every drain of every phase, servicing directives with the given
    /// fan-out. Returns the number of directives serviced.
    pub async fn fetch_all(&mut self, concurrency: usize) -> Result<u64> {
        let mut fetched = 0u64;

        while let Some(drain) = self.next_drain()? {
            if drain.is_empty() {
                continue;
            }
            debug!("draining {} ({} items)", drain.name, drain.len());
            fetched += drain.len() as u64;

            stream::iter(drain.directives.iter().map(|d| self.fetch(d)))
                .buffer_unordered(concurrency.max(1))
                .try_collect::<Vec<()>>()
                .await?;
        }

        Ok(fetched)
    }
}
