//! Bootstrapping an archive that declares its own dependencies.
//!
//! The running archive carries a manifest resource. [`Bootstrap`] reads it,
//! prepares the dependencies, relocates a copy of the archive itself with
//! the same rules (so its references point at the relocated packages),
//! builds an isolated scope with that copy first, and drives the
//! host-supplied instance through its lifecycle.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use stowage_config::LoaderConfig;
use stowage_core::hash::sha1_file;
use stowage_core::{Manifest, RelocationRules};
use stowage_relocator::JarRelocator;
use stowage_telemetry::{LogConfig, TelemetryError};
use tracing::{debug, info, warn};
use zip::ZipArchive;
use zip::result::ZipError;

use crate::error::{HostError, LoaderError, LoaderResult};
use crate::loader::Loader;
use crate::scope::{IsolatedScope, Scope};

/// Capability interface implemented by the host-constructed instance.
///
/// Every method defaults to doing nothing.
pub trait Lifecycle: Send {
    /// Called once, right after construction.
    ///
    /// # Errors
    ///
    /// Any error fails the bootstrap.
    fn on_load(&mut self) -> Result<(), HostError> {
        Ok(())
    }

    /// Called when the instance is activated.
    ///
    /// # Errors
    ///
    /// Any error leaves the instance loaded but not enabled.
    fn on_enable(&mut self) -> Result<(), HostError> {
        Ok(())
    }

    /// Called when the instance is deactivated.
    ///
    /// # Errors
    ///
    /// Any error is reported; the instance is considered disabled anyway.
    fn on_disable(&mut self) -> Result<(), HostError> {
        Ok(())
    }
}

/// Lifecycle state of a bootstrapped instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleState {
    /// Nothing has been loaded yet.
    Created,
    /// `on_load` succeeded.
    Loaded,
    /// `on_enable` succeeded.
    Enabled,
    /// `on_disable` ran.
    Disabled,
    /// Bootstrap or a lifecycle call failed.
    Failed(String),
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => f.write_str("created"),
            Self::Loaded => f.write_str("loaded"),
            Self::Enabled => f.write_str("enabled"),
            Self::Disabled => f.write_str("disabled"),
            Self::Failed(reason) => write!(f, "failed ({reason})"),
        }
    }
}

/// Read the manifest resource `resource` out of `archive`.
///
/// # Errors
///
/// Returns [`LoaderError::MissingManifest`] if the entry is absent, or a
/// read or decode error.
pub fn read_embedded_manifest(archive: &Path, resource: &str) -> LoaderResult<Manifest> {
    let file = File::open(archive).map_err(|e| LoaderError::io(archive, e))?;
    let mut zip =
        ZipArchive::new(BufReader::new(file)).map_err(|e| LoaderError::archive(archive, e))?;
    let mut entry = match zip.by_name(resource) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => {
            return Err(LoaderError::MissingManifest {
                archive: archive.to_path_buf(),
                resource: resource.to_owned(),
            });
        },
        Err(e) => return Err(LoaderError::archive(archive, e)),
    };
    let mut json = Vec::new();
    entry
        .read_to_end(&mut json)
        .map_err(|e| LoaderError::io(archive, e))?;
    Ok(Manifest::from_slice(&json)?)
}

/// Install a global log subscriber for the loader.
///
/// Returns `false` if the host already installed one, which is then kept.
///
/// # Errors
///
/// Returns an error if `config` is invalid.
pub fn install_logging(config: &LogConfig) -> LoaderResult<bool> {
    match stowage_telemetry::setup_logging(config) {
        Ok(()) => Ok(true),
        Err(TelemetryError::Init { message }) => {
            debug!(reason = %message, "Keeping existing log subscriber");
            Ok(false)
        },
        Err(e) => Err(e.into()),
    }
}

/// Drives one self-describing archive from manifest to enabled instance.
pub struct Bootstrap {
    loader: Loader,
    self_archive: PathBuf,
    relocated_self: Option<PathBuf>,
    scope: Option<Arc<IsolatedScope>>,
    instance: Option<Box<dyn Lifecycle>>,
    state: LifecycleState,
}

impl fmt::Debug for Bootstrap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bootstrap")
            .field("self_archive", &self.self_archive)
            .field("relocated_self", &self.relocated_self)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Bootstrap {
    /// Read the manifest embedded in `self_archive` and set up a loader.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest is missing or malformed, or the
    /// configuration is invalid.
    pub fn new(config: LoaderConfig, self_archive: impl Into<PathBuf>) -> LoaderResult<Self> {
        let self_archive = self_archive.into();
        let manifest = read_embedded_manifest(&self_archive, config.manifest_resource())?;
        info!(
            archive = %self_archive.display(),
            dependencies = manifest.dependencies().len(),
            "Read embedded manifest"
        );
        Ok(Self {
            loader: Loader::new(config, manifest)?,
            self_archive,
            relocated_self: None,
            scope: None,
            instance: None,
            state: LifecycleState::Created,
        })
    }

    /// The underlying loader.
    #[must_use]
    pub fn loader(&self) -> &Loader {
        &self.loader
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> &LifecycleState {
        &self.state
    }

    /// The isolated scope, once loaded.
    #[must_use]
    pub fn scope(&self) -> Option<&Arc<IsolatedScope>> {
        self.scope.as_ref()
    }

    /// Path of the relocated copy of the bootstrapped archive, once loaded.
    #[must_use]
    pub fn relocated_self(&self) -> Option<&Path> {
        self.relocated_self.as_deref()
    }

    /// Prepare dependencies, relocate the archive itself, build the
    /// isolated scope over `parent`, construct the instance through
    /// `factory`, and call its `on_load`.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::InvalidState`] unless the bootstrap is freshly
    /// created, otherwise the first failure of any step. A failure moves the
    /// state to [`LifecycleState::Failed`].
    pub async fn load<F>(&mut self, parent: Arc<dyn Scope>, factory: F) -> LoaderResult<()>
    where
        F: FnOnce(&Arc<IsolatedScope>) -> Result<Box<dyn Lifecycle>, HostError>,
    {
        if self.state != LifecycleState::Created {
            return Err(LoaderError::InvalidState {
                operation: "load",
                state: self.state.clone(),
            });
        }
        let result = self.load_inner(parent, factory).await;
        match &result {
            Ok(()) => {
                self.state = LifecycleState::Loaded;
                info!(archive = %self.self_archive.display(), "Bootstrap loaded");
            },
            Err(e) => {
                warn!(archive = %self.self_archive.display(), error = %e, "Bootstrap failed");
                self.state = LifecycleState::Failed(e.to_string());
            },
        }
        result
    }

    async fn load_inner<F>(&mut self, parent: Arc<dyn Scope>, factory: F) -> LoaderResult<()>
    where
        F: FnOnce(&Arc<IsolatedScope>) -> Result<Box<dyn Lifecycle>, HostError>,
    {
        self.loader.prepare().await?;

        let rules = self.loader.effective_rules();
        let relocated = relocate_self(
            self.self_archive.clone(),
            self.loader.config().scratch_dir().to_path_buf(),
            rules,
        )
        .await?;

        let scope = Arc::new(
            self.loader
                .create_isolated_scope(parent, std::slice::from_ref(&relocated))?,
        );
        self.relocated_self = Some(relocated);

        let mut instance = factory(&scope).map_err(|source| LoaderError::Lifecycle {
            phase: "construct",
            source,
        })?;
        instance.on_load().map_err(|source| LoaderError::Lifecycle {
            phase: "on_load",
            source,
        })?;

        self.scope = Some(scope);
        self.instance = Some(instance);
        Ok(())
    }

    /// Call the instance's `on_enable`.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::InvalidState`] unless loaded or disabled, or
    /// the host's error. A host error leaves the state unchanged.
    pub fn enable(&mut self) -> LoaderResult<()> {
        let instance = match (&self.state, self.instance.as_mut()) {
            (LifecycleState::Loaded | LifecycleState::Disabled, Some(instance)) => instance,
            _ => {
                return Err(LoaderError::InvalidState {
                    operation: "enable",
                    state: self.state.clone(),
                });
            },
        };
        instance.on_enable().map_err(|source| LoaderError::Lifecycle {
            phase: "on_enable",
            source,
        })?;
        self.state = LifecycleState::Enabled;
        Ok(())
    }

    /// Call the instance's `on_disable`.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::InvalidState`] unless enabled, or the host's
    /// error. The state becomes disabled either way.
    pub fn disable(&mut self) -> LoaderResult<()> {
        let instance = match (&self.state, self.instance.as_mut()) {
            (LifecycleState::Enabled, Some(instance)) => instance,
            _ => {
                return Err(LoaderError::InvalidState {
                    operation: "disable",
                    state: self.state.clone(),
                });
            },
        };
        let result = instance.on_disable();
        self.state = LifecycleState::Disabled;
        result.map_err(|source| LoaderError::Lifecycle {
            phase: "on_disable",
            source,
        })
    }
}

/// Relocate `archive` into `scratch_dir` under `rules`, naming the copy
/// after the archive's hash and the rule set.
async fn relocate_self(
    archive: PathBuf,
    scratch_dir: PathBuf,
    rules: RelocationRules,
) -> LoaderResult<PathBuf> {
    tokio::task::spawn_blocking(move || {
        let hash = sha1_file(&archive).map_err(|e| LoaderError::io(&archive, e))?;
        std::fs::create_dir_all(&scratch_dir).map_err(|e| LoaderError::io(&scratch_dir, e))?;
        let output = scratch_dir.join(format!("self-{hash}-{}.jar", rules.set_hash()));
        let stats = JarRelocator::new(&archive, &output, rules)
            .run()
            .map_err(|source| LoaderError::Relocation {
                archive: archive.clone(),
                source,
            })?;
        debug!(
            archive = %archive.display(),
            output = %output.display(),
            classes = stats.classes_rewritten,
            "Relocated bootstrapped archive"
        );
        Ok(output)
    })
    .await
    .map_err(|e| LoaderError::TaskFailed {
        message: e.to_string(),
    })?
}
