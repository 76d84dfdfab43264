//! On-demand retrieval of computed files
//!
//! The special remote side: decide which URLs belong to us, report presence
//! and re-run the recorded computation to produce a key's content.

use crate::config::ComputeConfig;
use crate::error::ComputeError;
use dmake_codec::{
    is_provenance_url, template_path, CodecError, DatasetPath, Parameters, ProvenanceUrl, Record,
    LEGACY_RECORD_PREFIX, RECORD_SCHEME, URL_SCHEME,
};
use dmake_runner::TemplateRunner;
use dmake_workspace::{unlock_outputs, Backend, Provisioner};
use std::path::{Path, PathBuf};

/// Parameter name the destination is bound to for record templates
pub const OUTPUT_PARAMETER: &str = "output";

/// Services git-annex provides to a special remote
pub trait AnnexHost {
    /// All URLs registered for `key` starting with `prefix`
    ///
    /// # Errors
    /// Returns an error if the host cannot be asked.
    fn get_urls(&mut self, key: &str, prefix: &str) -> Result<Vec<String>, ComputeError>;

    /// Repository metadata directory of the dataset being served
    ///
    /// # Errors
    /// Returns an error if the host cannot be asked.
    fn git_dir(&mut self) -> Result<PathBuf, ComputeError>;

    /// Forward a debug message
    fn debug(&mut self, message: &str);
}

/// URL prefixes claimed by the remote
#[must_use]
pub fn claimed_prefixes() -> [String; 3] {
    [
        LEGACY_RECORD_PREFIX.to_string(),
        format!("{RECORD_SCHEME}:"),
        format!("{URL_SCHEME}:"),
    ]
}

/// Retrieval adapter re-running computations on demand
#[derive(Debug, Clone)]
pub struct ComputeRemote<B: Backend> {
    backend: B,
    runner: TemplateRunner,
    config: ComputeConfig,
}

impl<B: Backend> ComputeRemote<B> {
    /// Adapter with default configuration
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            runner: TemplateRunner::new(),
            config: ComputeConfig::default(),
        }
    }

    /// With configuration
    #[must_use]
    pub fn with_config(mut self, config: ComputeConfig) -> Self {
        self.config = config;
        self
    }

    /// Configuration in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ComputeConfig {
        &self.config
    }

    /// Cost reported to git-annex
    #[inline]
    #[must_use]
    pub fn cost(&self) -> u32 {
        self.config.remote.cost
    }

    /// Whether `url` is one of ours
    #[must_use]
    pub fn claim(&self, url: &str) -> bool {
        claimed_prefixes().iter().any(|prefix| url.starts_with(prefix.as_str()))
    }

    /// Same decision as [`ComputeRemote::claim`]
    #[must_use]
    pub fn checkurl(&self, url: &str) -> bool {
        self.claim(url)
    }

    /// Whether `key` has at least one provenance location
    ///
    /// # Errors
    /// Returns an error if the host cannot be asked.
    pub fn checkpresent<H: AnnexHost>(&self, host: &mut H, key: &str) -> Result<bool, ComputeError> {
        Ok(provenance_urls(host, key)?.next().is_some())
    }

    /// Produce the content of `key` at `destination`
    ///
    /// `datalad-make:` locations are recomputed in a workspace; `compute:`
    /// records run their template directly in the dataset.
    ///
    /// # Errors
    /// - `ComputeError::NoProvenance` if no location of the key is ours
    /// - `ComputeError::MalformedRecord` if the locations do not decode to
    ///   one computation
    /// - runner, provisioning or IO errors of the recomputation
    pub fn retrieve<H: AnnexHost>(
        &self,
        host: &mut H,
        key: &str,
        destination: &Path,
    ) -> Result<(), ComputeError> {
        let urls: Vec<String> = provenance_urls(host, key)?.collect();
        if urls.is_empty() {
            return Err(ComputeError::NoProvenance(key.to_string()));
        }

        let git_dir = host.git_dir()?;
        let dataset = git_dir.parent().map(Path::to_path_buf).ok_or_else(|| {
            ComputeError::Config(format!("no dataset around {}", git_dir.display()))
        })?;

        let descriptors = urls
            .iter()
            .filter(|url| ProvenanceUrl::matches_scheme(url))
            .map(|url| url.parse::<ProvenanceUrl>())
            .collect::<Result<Vec<_>, _>>()?;

        if descriptors.is_empty() {
            host.debug(&format!("recomputing {key} from record"));
            self.retrieve_record(&dataset, &urls, destination)
        } else {
            host.debug(&format!("recomputing {key} in a workspace"));
            self.retrieve_descriptor(&dataset, &descriptors, destination)
        }
    }

    fn retrieve_record(
        &self,
        dataset: &Path,
        urls: &[String],
        destination: &Path,
    ) -> Result<(), ComputeError> {
        let record = Record::from_urls(urls)?;
        tracing::info!(root_id = %record.root_id, method = %record.method, "retrieving from record");

        let destination_arg = destination.to_string_lossy().into_owned();
        let parameters: Parameters = record
            .parameters
            .iter()
            .filter(|(name, _)| *name != OUTPUT_PARAMETER)
            .chain(std::iter::once((OUTPUT_PARAMETER, destination_arg.as_str())))
            .collect();

        let template = template_path(dataset, &record.method);
        self.runner.run(&template, &parameters, dataset)?;

        if !destination.exists() {
            return Err(ComputeError::io_error(
                destination,
                std::io::Error::new(std::io::ErrorKind::NotFound, "template wrote no output"),
            ));
        }
        Ok(())
    }

    fn retrieve_descriptor(
        &self,
        dataset: &Path,
        urls: &[ProvenanceUrl],
        destination: &Path,
    ) -> Result<(), ComputeError> {
        let Some(first) = urls.first() else {
            return Err(ComputeError::NoProvenance(destination.display().to_string()));
        };
        if let Some(other) = urls
            .iter()
            .find(|u| u.descriptor.root_id != first.descriptor.root_id)
        {
            return Err(CodecError::malformed(format!(
                "expected a single identity, got '{}' and '{}'",
                first.descriptor.root_id, other.descriptor.root_id
            ))
            .into());
        }

        let descriptor = &first.descriptor;
        let this: &DatasetPath = match &first.this {
            Some(this) => this,
            None => descriptor.outputs.first().ok_or_else(|| {
                ComputeError::from(CodecError::malformed("no output declared"))
            })?,
        };
        tracing::info!(
            root_id = %descriptor.root_id,
            revision = %descriptor.revision,
            method = %descriptor.method,
            output = %this,
            fingerprint = %descriptor.fingerprint().short(),
            "retrieving from descriptor"
        );

        let provisioner =
            Provisioner::new(&self.backend).with_workspace_root(self.config.workspace_root());
        let workspace =
            provisioner.provision_scoped(dataset, Some(&descriptor.revision), &descriptor.inputs)?;
        let worktree = workspace.path();

        unlock_outputs(&self.backend, worktree, &descriptor.outputs)?;
        let template = descriptor.template_path(worktree);
        self.runner.run(&template, &descriptor.parameters, worktree)?;

        let produced = this.to_path(worktree);
        if std::fs::symlink_metadata(&produced).is_err() {
            return Err(ComputeError::MissingOutput(this.clone()));
        }
        std::fs::copy(&produced, destination)
            .map_err(|e| ComputeError::io_error(destination, e))?;

        workspace.release()?;
        Ok(())
    }
}

fn provenance_urls<H: AnnexHost>(
    host: &mut H,
    key: &str,
) -> Result<impl Iterator<Item = String>, ComputeError> {
    Ok(host
        .get_urls(key, "")?
        .into_iter()
        .filter(|url| is_provenance_url(url)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dmake_workspace::GitAnnexBackend;

    #[test]
    fn claims_all_provenance_prefixes() {
        let remote = ComputeRemote::new(GitAnnexBackend::new());
        assert!(remote.claim("URL--compute:abc"));
        assert!(remote.claim("compute://ds/method/ZG91YmxlLnNo"));
        assert!(remote.claim("datalad-make:///?root_id=x"));
        assert!(!remote.claim("https://example.org/compute:x"));
        assert!(!remote.checkurl("file:///tmp/x"));
    }

    #[test]
    fn default_cost() {
        assert_eq!(ComputeRemote::new(GitAnnexBackend::new()).cost(), 100);
    }
}
