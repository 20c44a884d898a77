//! Typed PSV records served by version servers

use keg_psv::{PsvDocument, PsvRow, PsvSchema};

fn get(row: &PsvRow, schema: &PsvSchema, name: &str) -> String {
    row.get_by_name(name, schema).unwrap_or_default().to_string()
}

fn get_hex(row: &PsvRow, schema: &PsvSchema, name: &str) -> String {
    get(row, schema, name).to_ascii_lowercase()
}

/// One row of `/versions`: per region, the published build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versions {
    pub region: String,
    pub build_config: String,
    pub build_id: String,
    pub cdn_config: String,
    pub keyring: String,
    pub product_config: String,
    pub versions_name: String,
}

impl Versions {
    pub fn from_document(doc: &PsvDocument) -> Vec<Self> {
        let schema = doc.schema();
        doc.rows()
            .iter()
            .map(|row| Self {
                region: get(row, schema, "Region"),
                build_config: get_hex(row, schema, "BuildConfig"),
                // BuildId vs BuildID: schema lookup is case-insensitive.
                build_id: get(row, schema, "BuildId"),
                cdn_config: get_hex(row, schema, "CDNConfig"),
                keyring: get_hex(row, schema, "KeyRing"),
                product_config: get_hex(row, schema, "ProductConfig"),
                versions_name: get(row, schema, "VersionsName"),
            })
            .collect()
    }
}

/// One row of `/cdns`: a named set of content origins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cdns {
    pub name: String,
    pub path: String,
    pub config_path: String,
    pub hosts: Vec<String>,
    pub servers: Vec<String>,
}

impl Cdns {
    pub fn from_document(doc: &PsvDocument) -> Vec<Self> {
        let schema = doc.schema();
        doc.rows()
            .iter()
            .map(|row| Self {
                name: get(row, schema, "Name"),
                path: get(row, schema, "Path"),
                config_path: get(row, schema, "ConfigPath"),
                hosts: get(row, schema, "Hosts")
                    .split_whitespace()
                    .map(str::to_string)
                    .collect(),
                servers: get(row, schema, "Servers")
                    .split_whitespace()
                    .map(str::to_string)
                    .collect(),
            })
            .collect()
    }

    /// Every usable origin: explicit servers first, then plain-HTTP hosts.
    pub fn all_servers(&self) -> Vec<String> {
        self.servers
            .iter()
            .cloned()
            .chain(self.hosts.iter().map(|h| format!("http://{h}")))
            .collect()
    }
}

/// One row of `/bgdl`: the background-download variant of a version row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bgdl {
    pub region: String,
    pub build_config: String,
    pub build_id: String,
    pub cdn_config: String,
    pub keyring: String,
    pub product_config: String,
    pub versions_name: String,
}

impl Bgdl {
    pub fn from_document(doc: &PsvDocument) -> Vec<Self> {
        Versions::from_document(doc)
            .into_iter()
            .map(|v| Self {
                region: v.region,
                build_config: v.build_config,
                build_id: v.build_id,
                cdn_config: v.cdn_config,
                keyring: v.keyring,
                product_config: v.product_config,
                versions_name: v.versions_name,
            })
            .collect()
    }
}

/// One row of `/blobs`: per-region install/game blob digests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blobs {
    pub region: String,
    pub install_blob_md5: String,
    pub game_blob_md5: String,
}

impl Blobs {
    pub fn from_document(doc: &PsvDocument) -> Vec<Self> {
        let schema = doc.schema();
        doc.rows()
            .iter()
            .map(|row| Self {
                region: get(row, schema, "Region"),
                install_blob_md5: get_hex(row, schema, "InstallBlobMD5"),
                game_blob_md5: get_hex(row, schema, "GameBlobMD5"),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_versions_from_document() {
        let doc = PsvDocument::parse(
            "Region!STRING:0|BuildConfig!HEX:16|CDNConfig!HEX:16|KeyRing!HEX:16|BuildId!DEC:4|VersionsName!String:0|ProductConfig!HEX:16\n\
             us|4EB3986466EC004FFA1755642B375A87|fb445ca0526699c61a92830ab894a985||27291|8.0.1.27291|19a26886b5b1c264de1177ae6aa7fbf5",
        )
        .unwrap();

        let versions = Versions::from_document(&doc);
        assert_eq!(versions.len(), 1);
        let v = &versions[0];
        assert_eq!(v.region, "us");
        // Hex columns are normalized to lowercase.
        assert_eq!(v.build_config, "4eb3986466ec004ffa1755642b375a87");
        assert_eq!(v.build_id, "27291");
        assert_eq!(v.keyring, "");
        assert_eq!(v.versions_name, "8.0.1.27291");
    }

    #[test]
    fn test_versions_old_remote_missing_columns() {
        let doc =
            PsvDocument::parse("Region!STRING:0|BuildConfig!HEX:16|CDNConfig!HEX:16\nus|aa|bb")
                .unwrap();
        let versions = Versions::from_document(&doc);
        assert_eq!(versions[0].build_id, "");
        assert_eq!(versions[0].product_config, "");
        assert_eq!(versions[0].versions_name, "");
    }

    #[test]
    fn test_cdns_all_servers() {
        let doc = PsvDocument::parse(
            "Name!STRING:0|Path!STRING:0|Hosts!STRING:0|Servers!STRING:0|ConfigPath!STRING:0\n\
             us|tpr/hsb|a.example.com b.example.com|https://c.example.com/?fallback=1|tpr/configs/data",
        )
        .unwrap();

        let cdns = Cdns::from_document(&doc);
        let cdn = &cdns[0];
        assert_eq!(cdn.hosts.len(), 2);
        assert_eq!(
            cdn.all_servers(),
            vec![
                "https://c.example.com/?fallback=1".to_string(),
                "http://a.example.com".to_string(),
                "http://b.example.com".to_string(),
            ]
        );
        assert_eq!(cdn.config_path, "tpr/configs/data");
    }

    #[test]
    fn test_cdns_old_remote_without_servers() {
        let doc = PsvDocument::parse("Name!STRING:0|Path!STRING:0|Hosts!STRING:0\nus|tpr/hsb|a.example.com")
            .unwrap();
        let cdns = Cdns::from_document(&doc);
        assert_eq!(cdns[0].all_servers(), vec!["http://a.example.com"]);
        assert_eq!(cdns[0].config_path, "");
    }

    #[test]
    fn test_blobs() {
        let doc = PsvDocument::parse(
            "Region!STRING:0|InstallBlobMD5!HEX:16|GameBlobMD5!HEX:16\nus|AABB|ccdd",
        )
        .unwrap();
        let blobs = Blobs::from_document(&doc);
        assert_eq!(blobs[0].install_blob_md5, "aabb");
        assert_eq!(blobs[0].game_blob_md5, "ccdd");
    }
}
