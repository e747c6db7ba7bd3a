//! # Almacén de Artefactos
//! src/artifacts.rs
//!
//! Guarda el PSD generado por task id y lo devuelve en la descarga.
//! El task id se valida contra una allow-list antes de formar cualquier
//! ruta; el nombre de archivo que ve el cliente es solo presentación.

use crate::error::ArtifactError;
use crate::jobs::types::Dimensions;
use chrono::{DateTime, Local};
use regex::Regex;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

const EXTENSION: &str = "psd";

/// Persistencia de artefactos terminados
pub trait ArtifactStore: Send + Sync {
    fn write(&self, task_id: &str, bytes: &[u8]) -> Result<(), ArtifactError>;

    /// `None` si el artefacto no existe (nunca generado o ya limpiado)
    fn read(&self, task_id: &str) -> Result<Option<Vec<u8>>, ArtifactError>;
}

fn task_id_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").ok())
        .as_ref()
}

/// Acepta solo caracteres de identificador; rechaza `..`, `/`, `\` y vacío
pub fn validate_task_id(task_id: &str) -> Result<(), ArtifactError> {
    if task_id_pattern().is_some_and(|re| re.is_match(task_id)) {
        Ok(())
    } else {
        Err(ArtifactError::InvalidTaskId)
    }
}

/// Un archivo por tarea: `{dir}/{taskId}.psd`
pub struct FileArtifactStore {
    dir: PathBuf,
}

impl FileArtifactStore {
    /// Crea el directorio si no existe
    pub fn open(dir: impl AsRef<Path>) -> io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        debug!(dir = %dir.display(), "Artifact directory ready");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, task_id: &str) -> Result<PathBuf, ArtifactError> {
        validate_task_id(task_id)?;
        Ok(self.dir.join(format!("{}.{}", task_id, EXTENSION)))
    }
}

impl ArtifactStore for FileArtifactStore {
    fn write(&self, task_id: &str, bytes: &[u8]) -> Result<(), ArtifactError> {
        let path = self.path_for(task_id)?;

        // Escritura atómica: temporal sincronizado a disco + rename
        let temp_path = path.with_extension(format!("{}.tmp", EXTENSION));
        if let Err(e) = write_synced(&temp_path, bytes).and_then(|()| fs::rename(&temp_path, &path)) {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }
        // El rename queda registrado cuando se sincroniza el directorio
        if let Err(e) = File::open(&self.dir).and_then(|dir| dir.sync_all()) {
            debug!(task_id, error = %e, "Could not sync artifact directory");
        }

        debug!(task_id, bytes = bytes.len(), "Artifact written");
        Ok(())
    }

    fn read(&self, task_id: &str) -> Result<Option<Vec<u8>>, ArtifactError> {
        let path = self.path_for(task_id)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(bytes)?;
    writer.flush()?;
    writer.get_ref().sync_all()
}

/// Reemplaza caracteres no válidos en nombres de archivo por `_`
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    // Sin nombres que sean solo puntos ("." / "..")
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "design".to_string()
    } else {
        cleaned
    }
}

/// `{proyecto}_{L}x{W}x{H}cm_{yyyyMMddHHmm}.psd`
pub fn download_file_name(project_name: &str, dimensions: &Dimensions, at: DateTime<Local>) -> String {
    format!(
        "{}_{}x{}x{}cm_{}.{}",
        sanitize_file_name(project_name),
        dimensions.length,
        dimensions.width,
        dimensions.height,
        at.format("%Y%m%d%H%M"),
        EXTENSION
    )
}

/// Nombre presentado en la descarga: el pedido por el cliente (saneado y
/// con extensión .psd) o uno derivado del task id
pub fn presented_file_name(requested: Option<&str>, task_id: &str) -> String {
    match requested.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => {
            let name = sanitize_file_name(name);
            if name.to_ascii_lowercase().ends_with(".psd") {
                name
            } else {
                format!("{}.{}", name, EXTENSION)
            }
        }
        None => format!("{}.{}", task_id, EXTENSION),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn store() -> (TempDir, FileArtifactStore) {
        let dir = TempDir::new().unwrap();
        let store = FileArtifactStore::open(dir.path().join("artifacts")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_open_creates_directory() {
        let (_dir, store) = store();
        assert!(store.dir().is_dir());
    }

    #[test]
    fn test_write_then_read() {
        let (_dir, store) = store();
        store.write("abc123", b"8BPS-data").unwrap();
        assert_eq!(store.read("abc123").unwrap().as_deref(), Some(&b"8BPS-data"[..]));
        assert!(store.dir().join("abc123.psd").is_file());
        assert!(!store.dir().join("abc123.psd.tmp").exists());
    }

    #[test]
    fn test_write_synced_persists_full_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x.psd.tmp");
        let bytes = vec![7u8; 64 * 1024];
        write_synced(&path, &bytes).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), bytes.len() as u64);
    }

    #[test]
    fn test_write_into_missing_dir_fails_cleanly() {
        let (_dir, store) = store();
        fs::remove_dir_all(store.dir()).unwrap();
        let result = store.write("abc123", b"8BPS");
        assert!(matches!(result, Err(ArtifactError::Io(_))));
        assert!(!store.dir().join("abc123.psd.tmp").exists());
    }

    #[test]
    fn test_read_missing_is_none() {
        let (_dir, store) = store();
        assert!(store.read("missing").unwrap().is_none());
    }

    #[test]
    fn test_overwrite_replaces_content() {
        let (_dir, store) = store();
        store.write("t1", b"first").unwrap();
        store.write("t1", b"second").unwrap();
        assert_eq!(store.read("t1").unwrap().unwrap(), b"second");
    }

    #[test]
    fn test_validate_task_id() {
        assert!(validate_task_id("4f0c2a9e8b7d4c3a9e8b7d4c3a9e8b7d").is_ok());
        assert!(validate_task_id("task_1-a").is_ok());

        for bad in ["", "..", "../etc", "a/b", "a\\b", "a.b", "a b", "ñ"] {
            assert!(validate_task_id(bad).is_err(), "accepted {:?}", bad);
        }
        assert!(validate_task_id(&"x".repeat(64)).is_ok());
        assert!(validate_task_id(&"x".repeat(65)).is_err());
    }

    #[test]
    fn test_traversal_rejected_before_touching_disk() {
        let (dir, store) = store();
        assert!(matches!(store.read("../secret"), Err(ArtifactError::InvalidTaskId)));
        assert!(matches!(store.write("..", b"x"), Err(ArtifactError::InvalidTaskId)));
        assert!(!dir.path().join(".psd").exists());
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("Joint/Cream:v2"), "Joint_Cream_v2");
        assert_eq!(sanitize_file_name("a\\b*c?"), "a_b_c_");
        assert_eq!(sanitize_file_name(".."), "design");
        assert_eq!(sanitize_file_name("   "), "design");
        assert_eq!(sanitize_file_name("护手霜"), "护手霜");
    }

    #[test]
    fn test_download_file_name() {
        let at = Local.with_ymd_and_hms(2025, 3, 7, 9, 5, 0).unwrap();
        let dims = Dimensions {
            length: 10.0,
            width: 4.5,
            height: 15.0,
        };
        assert_eq!(
            download_file_name("Joint Cream", &dims, at),
            "Joint Cream_10x4.5x15cm_202503070905.psd"
        );
    }

    #[test]
    fn test_presented_file_name() {
        assert_eq!(presented_file_name(None, "t1"), "t1.psd");
        assert_eq!(presented_file_name(Some(""), "t1"), "t1.psd");
        assert_eq!(presented_file_name(Some("box.PSD"), "t1"), "box.PSD");
        assert_eq!(presented_file_name(Some("../box"), "t1"), ".._box.psd");
    }
}
