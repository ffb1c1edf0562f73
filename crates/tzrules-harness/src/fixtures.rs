//! Test fixtures and scratch space
//!
//! The scenarios install two OEM-built data app packages, `test1` and
//! `test2`, shipped alongside the harness as `<prefix>_<id>.apk`. Each
//! scenario copies the one it needs into its own scratch directory, which is
//! removed when the scenario ends however it ends.

use crate::error::FixtureError;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tzrules_device::RulesVersion;

/// Named test package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Fixture {
    /// Rules newer than any system image: IANA 2030a, revision 1
    Test1,
    /// Rules older than the system image
    Test2,
}

impl Fixture {
    /// Identifier used in the fixture file name
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Fixture::Test1 => "test1",
            Fixture::Test2 => "test2",
        }
    }

    /// Rules version carried by `test1`
    #[must_use]
    pub fn test1_version() -> RulesVersion {
        RulesVersion::new("2030a", 1)
    }

    /// Rules version the package carries, when the harness depends on it
    #[must_use]
    pub fn rules_version(self) -> Option<RulesVersion> {
        match self {
            Fixture::Test1 => Some(Self::test1_version()),
            Fixture::Test2 => None,
        }
    }
}

/// Scratch directory owned by a single scenario run
///
/// Deleted on drop; [`ScratchDir::close`] deletes it and reports failures.
#[derive(Debug)]
pub struct ScratchDir {
    dir: TempDir,
}

impl ScratchDir {
    /// Create a fresh, empty scratch directory
    ///
    /// # Errors
    /// `FixtureError::Io` if the directory cannot be created.
    pub fn create() -> Result<Self, FixtureError> {
        let dir = tempfile::Builder::new()
            .prefix("timeZoneUpdateTest")
            .tempdir()?;
        tracing::debug!(path = %dir.path().display(), "created scratch directory");
        Ok(Self { dir })
    }

    /// Get the directory path
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Delete the directory and everything in it
    ///
    /// # Errors
    /// `FixtureError::Io` if removal fails.
    pub fn close(self) -> Result<(), FixtureError> {
        let path = self.dir.path().to_path_buf();
        self.dir.close()?;
        tracing::debug!(path = %path.display(), "removed scratch directory");
        Ok(())
    }
}

/// Directory of OEM fixture packages
#[derive(Debug, Clone)]
pub struct FixtureStore {
    dir: PathBuf,
    apk_prefix: String,
}

impl FixtureStore {
    /// Fixtures named `<apk_prefix>_<id>.apk` inside `dir`
    pub fn new(dir: impl Into<PathBuf>, apk_prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            apk_prefix: apk_prefix.into(),
        }
    }

    /// File name of a fixture, e.g. `TimeZoneDataOemCorp_test1.apk`
    #[must_use]
    pub fn resource_name(&self, fixture: Fixture) -> String {
        format!("{}_{}.apk", self.apk_prefix, fixture.id())
    }

    /// Copy a fixture into the scratch directory
    ///
    /// # Errors
    /// - `FixtureError::NotFound` if the fixture file does not exist
    /// - `FixtureError::Io` if copying fails
    pub fn extract(&self, fixture: Fixture, scratch: &ScratchDir) -> Result<PathBuf, FixtureError> {
        let name = self.resource_name(fixture);
        let source = self.dir.join(&name);
        if !source.is_file() {
            return Err(FixtureError::NotFound {
                name,
                dir: self.dir.clone(),
            });
        }

        let (mut target, path) = tempfile::Builder::new()
            .prefix("temp")
            .suffix(".apk")
            .tempfile_in(scratch.path())?
            .keep()
            .map_err(|e| e.error)?;
        std::io::copy(&mut File::open(&source)?, &mut target)?;

        tracing::debug!(fixture = fixture.id(), path = %path.display(), "extracted fixture");
        Ok(path)
    }
}
