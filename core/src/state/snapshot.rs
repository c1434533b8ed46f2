//! 快照文件读写（整体覆盖，临时文件 + rename）

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// 原子写入 JSON：先写临时文件再重命名，读者永远看不到半个文件
pub fn write_json_atomic<T: Serialize, P: AsRef<Path>>(path: P, value: &T) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {:?}", parent))?;
    }

    let json = serde_json::to_string_pretty(value).context("Failed to serialize snapshot")?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).with_context(|| format!("Failed to write snapshot to {:?}", tmp))?;
    fs::rename(&tmp, path).with_context(|| format!("Failed to replace snapshot {:?}", path))?;
    Ok(())
}

/// 读取 JSON 快照；文件不存在时返回 `None`
pub fn read_json<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<Option<T>> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(None);
    }
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot from {:?}", path))?;
    let value = serde_json::from_str(&json)
        .with_context(|| format!("Failed to deserialize snapshot {:?}", path))?;
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("snap.json");
        let mut value = BTreeMap::new();
        value.insert("k".to_string(), 1u32);

        write_json_atomic(&path, &value).unwrap();
        let back: Option<BTreeMap<String, u32>> = read_json(&path).unwrap();
        assert_eq!(back, Some(value));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let back: Option<u32> = read_json(dir.path().join("none.json")).unwrap();
        assert!(back.is_none());
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{not json").unwrap();
        assert!(read_json::<u32, _>(&path).is_err());
    }
}
