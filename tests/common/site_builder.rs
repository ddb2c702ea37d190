//! Directory site generation

use std::path::Path;
use tempfile::TempDir;
use tokio::fs;

/// A directory site in a temporary directory
pub struct SiteBuilder {
    dir: TempDir,
}

impl SiteBuilder {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// The site as a command-line style spec (its path)
    pub fn spec(&self) -> String {
        self.dir.path().display().to_string()
    }

    /// Write `features/<key>/feature.toml` declaring `plugins`, and the
    /// plugin directories themselves
    pub async fn feature(&self, key: &str, plugins: &[&str]) -> &Self {
        self.feature_with(key, plugins, "").await
    }

    /// Like [`feature`](Self::feature) with extra manifest TOML appended
    pub async fn feature_with(&self, key: &str, plugins: &[&str], body: &str) -> &Self {
        self.write_manifest(key, plugins, body).await;
        for plugin in plugins {
            let dir = self.path().join("plugins").join(plugin);
            fs::create_dir_all(&dir).await.unwrap();
            fs::write(dir.join("plugin.jar"), format!("jar of {plugin}"))
                .await
                .unwrap();
        }
        self
    }

    /// A feature whose plugins are declared but not present
    pub async fn broken_feature(&self, key: &str, plugins: &[&str]) -> &Self {
        self.write_manifest(key, plugins, "").await;
        self
    }

    async fn write_manifest(&self, key: &str, plugins: &[&str], body: &str) {
        let (id, version) = key.rsplit_once('_').unwrap();
        let dir = self.path().join("features").join(key);
        fs::create_dir_all(&dir).await.unwrap();

        let mut text = format!("identifier = {{ id = \"{id}\", version = \"{version}\" }}\n");
        for plugin in plugins {
            let (pid, pver) = plugin.rsplit_once('_').unwrap();
            text.push_str(&format!(
                "[[plugin_entries]]\nidentifier = {{ id = \"{pid}\", version = \"{pver}\" }}\n"
            ));
        }
        text.push_str(body);
        fs::write(dir.join("feature.toml"), text).await.unwrap();
    }

    /// Names of the entries under `plugins/`
    pub async fn plugin_dirs(&self) -> Vec<String> {
        entries(&self.path().join("plugins")).await
    }

    /// Names of the entries under `features/`
    pub async fn feature_dirs(&self) -> Vec<String> {
        entries(&self.path().join("features")).await
    }

    /// Leftover `.staging-*` directories
    pub async fn staging_dirs(&self) -> usize {
        entries(self.path())
            .await
            .iter()
            .filter(|name| name.starts_with(".staging-"))
            .count()
    }
}

async fn entries(dir: &Path) -> Vec<String> {
    let Ok(mut rd) = fs::read_dir(dir).await else {
        return Vec::new();
    };
    let mut names = Vec::new();
    while let Some(entry) = rd.next_entry().await.unwrap() {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    names
}

/// `[[included]]` table for a child
pub fn include(key: &str, optional: bool) -> String {
    let (id, version) = key.rsplit_once('_').unwrap();
    format!(
        "[[included]]\nidentifier = {{ id = \"{id}\", version = \"{version}\" }}\noptional = {optional}\n"
    )
}

/// `[[imports]]` table making the feature a patch of `key`
pub fn patch_of(key: &str) -> String {
    let (id, version) = key.rsplit_once('_').unwrap();
    format!(
        "[[imports]]\nidentifier = {{ id = \"{id}\", version = \"{version}\" }}\nkind = \"feature\"\npatch = true\n"
    )
}
