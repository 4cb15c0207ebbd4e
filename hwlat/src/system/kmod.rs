//! Detector kernel module discovery, loading and unloading.
//!
//! A module that is built in or already loaded is left alone. Only a module
//! loaded by this process is unloaded at teardown.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::debug;

use crate::config::Config;
use crate::domain::{DetectorError, Ownership, Result};

const MODULE_SUFFIXES: [&str; 4] = [".ko", ".ko.xz", ".ko.zst", ".ko.gz"];

/// How the module came to be present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleOrigin {
    Builtin,
    PreLoaded,
    /// Found on disk; loading and unloading are our responsibility
    LoadedByUs(PathBuf),
}

impl ModuleOrigin {
    pub fn ownership(&self) -> Ownership {
        match self {
            ModuleOrigin::Builtin | ModuleOrigin::PreLoaded => Ownership::NotOwned,
            ModuleOrigin::LoadedByUs(_) => Ownership::OwnedByUs,
        }
    }
}

#[derive(Debug)]
pub struct ModuleLoader {
    name: String,
    origin: ModuleOrigin,
    ownership: Ownership,
    loaded: bool,
    modprobe: PathBuf,
}

impl ModuleLoader {
    /// Classify `name` as built in, already loaded, or loadable from the module tree.
    ///
    /// # Errors
    /// `BackendUnavailable` when the module exists in none of those places.
    pub fn probe(name: &str, config: &Config) -> Result<Self> {
        let modules_dir = match &config.paths.modules_dir {
            Some(dir) => dir.clone(),
            None => default_modules_dir()?,
        };

        let builtin = fs::read_to_string(modules_dir.join("modules.builtin")).unwrap_or_default();
        let origin = if is_builtin(&builtin, name) {
            ModuleOrigin::Builtin
        } else if is_loaded(&fs::read_to_string(&config.paths.proc_modules)?, name) {
            ModuleOrigin::PreLoaded
        } else if let Some(path) = find_module_file(&modules_dir, name) {
            ModuleOrigin::LoadedByUs(path)
        } else {
            return Err(DetectorError::unavailable(
                name,
                format!("module {name} not found under {}", modules_dir.display()),
            ));
        };
        debug!("module {name}: {origin:?}");

        let loaded = !matches!(origin, ModuleOrigin::LoadedByUs(_));
        Ok(Self {
            name: name.to_string(),
            ownership: origin.ownership(),
            origin,
            loaded,
            modprobe: config.tools.modprobe.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn origin(&self) -> &ModuleOrigin {
        &self.origin
    }

    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    pub fn take_ownership(&mut self) {
        if self.origin != ModuleOrigin::Builtin {
            self.ownership = Ownership::OwnedByUs;
            self.loaded = true;
        }
    }

    pub fn load(&mut self) -> Result<()> {
        if self.loaded {
            debug!("not loading {} (already present)", self.name);
            return Ok(());
        }
        if !self.modprobe_run(&[]) {
            return Err(DetectorError::ModuleLoadFailed(self.name.clone()));
        }
        self.loaded = true;
        Ok(())
    }

    /// Unload if the module is ours. Repeated calls are no-ops.
    pub fn unload(&mut self) -> Result<()> {
        if !self.ownership.is_owned() || !self.loaded {
            debug!("not unloading {}", self.name);
            return Ok(());
        }
        if !self.modprobe_run(&["-r"]) {
            return Err(DetectorError::ModuleUnloadFailed(self.name.clone()));
        }
        self.loaded = false;
        Ok(())
    }

    fn modprobe_run(&self, flags: &[&str]) -> bool {
        debug!("{} {} {}", self.modprobe.display(), flags.join(" "), self.name);
        Command::new(&self.modprobe)
            .args(flags)
            .arg(&self.name)
            .status()
            .is_ok_and(|status| status.success())
    }
}

fn default_modules_dir() -> Result<PathBuf> {
    let release = fs::read_to_string("/proc/sys/kernel/osrelease")?;
    Ok(Path::new("/lib/modules").join(release.trim()))
}

/// Module names treat `-` and `_` as the same character.
fn same_module(a: &str, b: &str) -> bool {
    a.replace('-', "_") == b.replace('-', "_")
}

fn module_stem(file_name: &str) -> Option<&str> {
    MODULE_SUFFIXES.iter().find_map(|suffix| file_name.strip_suffix(suffix))
}

/// `modules.builtin` lists one object path per line, e.g. `kernel/drivers/misc/hwlat_detector.ko`.
pub fn is_builtin(listing: &str, name: &str) -> bool {
    listing.lines().any(|line| {
        let file_name = line.trim().rsplit('/').next().unwrap_or("");
        module_stem(file_name).is_some_and(|stem| same_module(stem, name))
    })
}

/// `/proc/modules` lists the module name as the first field of each line.
pub fn is_loaded(listing: &str, name: &str) -> bool {
    listing
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .any(|loaded| same_module(loaded, name))
}

fn find_module_file(dir: &Path, name: &str) -> Option<PathBuf> {
    let entries = fs::read_dir(dir).ok()?;
    let mut subdirs = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            subdirs.push(path);
        } else if entry
            .file_name()
            .to_str()
            .and_then(module_stem)
            .is_some_and(|stem| same_module(stem, name))
        {
            return Some(path);
        }
    }
    subdirs.into_iter().find_map(|sub| find_module_file(&sub, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROC_MODULES: &str = "\
nf_tables 344064 0 - Live 0x0000000000000000
hwlat_detector 16384 0 - Live 0x0000000000000000
";

    #[test]
    fn test_is_loaded() {
        assert!(is_loaded(PROC_MODULES, "hwlat_detector"));
        assert!(is_loaded(PROC_MODULES, "hwlat-detector"));
        assert!(!is_loaded(PROC_MODULES, "smi_detector"));
    }

    #[test]
    fn test_is_builtin() {
        let listing = "kernel/drivers/misc/smi_detector.ko\nkernel/fs/ext4/ext4.ko\n";
        assert!(is_builtin(listing, "smi_detector"));
        assert!(!is_builtin(listing, "hwlat_detector"));
    }

    fn sandbox() -> (tempfile::TempDir, Config) {
        let root = tempfile::tempdir().unwrap();
        let config = Config::sandboxed(root.path());
        fs::create_dir_all(root.path().join("proc")).unwrap();
        fs::create_dir_all(config.paths.modules_dir.as_ref().unwrap()).unwrap();
        fs::write(&config.paths.proc_modules, "nf_tables 344064 0 - Live 0x0\n").unwrap();
        (root, config)
    }

    #[test]
    fn test_missing_module_is_backend_unavailable() {
        let (_root, config) = sandbox();
        let err = ModuleLoader::probe("hwlat_detector", &config).unwrap_err();
        assert!(err.is_backend_unavailable());
    }

    #[test]
    fn test_preloaded_module_is_left_alone() {
        let (_root, config) = sandbox();
        fs::write(&config.paths.proc_modules, PROC_MODULES).unwrap();
        let mut kmod = ModuleLoader::probe("hwlat_detector", &config).unwrap();
        assert_eq!(kmod.origin(), &ModuleOrigin::PreLoaded);
        assert_eq!(kmod.ownership(), Ownership::NotOwned);
        // modprobe is absent in the sandbox; these succeed only as no-ops
        kmod.load().unwrap();
        kmod.unload().unwrap();
    }

    #[test]
    fn test_module_found_on_disk_is_ours() {
        let (_root, config) = sandbox();
        let dir = config.paths.modules_dir.clone().unwrap().join("kernel/drivers/misc");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("hwlat_detector.ko.xz"), b"").unwrap();

        let mut kmod = ModuleLoader::probe("hwlat_detector", &config).unwrap();
        assert!(matches!(kmod.origin(), ModuleOrigin::LoadedByUs(path) if path.ends_with("hwlat_detector.ko.xz")));
        assert_eq!(kmod.ownership(), Ownership::OwnedByUs);

        let err = kmod.load().unwrap_err();
        assert!(err.is_setup());
    }

    #[test]
    fn test_builtin_module_is_never_owned() {
        let (_root, config) = sandbox();
        let dir = config.paths.modules_dir.clone().unwrap();
        fs::write(dir.join("modules.builtin"), "kernel/drivers/misc/hwlat_detector.ko\n").unwrap();

        let mut kmod = ModuleLoader::probe("hwlat_detector", &config).unwrap();
        kmod.take_ownership();
        assert_eq!(kmod.ownership(), Ownership::NotOwned);
        kmod.unload().unwrap();
    }
}
