use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use flate2::{Compression, GzBuilder};
use log::info;

use crate::command::ToolCommand;
use crate::workdir::WorkDir;

/// Bundles `<workdir>/<dir_name>` into a gzip-compressed tar file.
/// `tar` writes the uncompressed stream and the gzip layer is added
/// here with a zeroed header timestamp and no file name, as `gzip -n`
/// does, so identical trees give identical bytes.
#[derive(Debug, Clone)]
pub struct Archiver {
    tar: PathBuf,
}

impl Default for Archiver {
    fn default() -> Self {
        Archiver {
            tar: PathBuf::from("tar"),
        }
    }
}

impl Archiver {
    pub fn new<P: Into<PathBuf>>(tar: P) -> Self {
        Archiver { tar: tar.into() }
    }

    pub fn command(&self, workdir: &WorkDir, dir_name: &str, keep: &[&Path]) -> Result<ToolCommand> {
        let mut cmd = ToolCommand::new(&self.tar)
            .arg("-c")
            .arg("-f")
            .arg("-")
            .arg("-C")
            .arg(workdir.root())
            // kept paths are literal names, and prefixes may hold `[`, `*` or `?`
            .arg("--no-wildcards");
        for path in keep.iter() {
            let rel = path
                .strip_prefix(workdir.root())
                .with_context(|| format!("{:?} is outside {:?}", path, workdir.root()))?;
            cmd = cmd.arg(format!("--exclude={}", rel.display()));
        }
        Ok(cmd.arg(dir_name))
    }

    /// Writes the archive to `archive` and returns the files it holds,
    /// relative to the working directory. Files listed in `keep` are
    /// left out.
    pub fn archive(&self, workdir: &WorkDir, dir_name: &str, keep: &[&Path], archive: &Path) -> Result<Vec<PathBuf>> {
        let cmd = self.command(workdir, dir_name, keep)?;

        let file = fs::File::create(archive).with_context(|| format!("creating {:?}", archive))?;
        let mut gz = GzBuilder::new().mtime(0).write(file, Compression::default());
        cmd.run_to_writer(&mut gz)?;
        gz.finish()?.flush()?;

        let keep: HashSet<&Path> = keep.iter().cloned().collect();
        let archived: Vec<PathBuf> = list_files(&workdir.join(dir_name))?
            .into_iter()
            .filter(|path| !keep.contains(path.as_path()))
            .collect();

        info!("archived {} files from {:?} into {:?}", archived.len(), dir_name, archive);
        Ok(archived)
    }
}

/// Every regular file under `dir`, in sorted order.
pub fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];

    while let Some(curr) = pending.pop() {
        for entry_res in fs::read_dir(&curr).with_context(|| format!("listing {:?}", curr))? {
            let entry = entry_res?;
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else {
                files.push(entry.path());
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Removes the archived files, then any directory under `dir` that is
/// left empty. `dir` itself goes too when nothing remains.
pub fn discard(dir: &Path, archived: &[PathBuf]) -> Result<()> {
    for path in archived.iter() {
        fs::remove_file(path).with_context(|| format!("removing {:?}", path))?;
    }
    remove_empty_dirs(dir)?;
    Ok(())
}

fn remove_empty_dirs(dir: &Path) -> Result<bool> {
    let mut empty = true;
    for entry_res in fs::read_dir(dir)? {
        let entry = entry_res?;
        if entry.file_type()?.is_dir() {
            if !remove_empty_dirs(&entry.path())? {
                empty = false;
            }
        } else {
            empty = false;
        }
    }
    if empty {
        fs::remove_dir(dir).with_context(|| format!("removing {:?}", dir))?;
    }
    Ok(empty)
}
