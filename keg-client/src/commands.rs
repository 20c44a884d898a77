//! Command implementations

use anyhow::Context;
use clap::Subcommand;
use std::collections::HashSet;
use std::path::Path;
use tracing::warn;

use keg_cdn::RemoteCdn;
use keg_core::{Fetcher, Keg, Phase};
use keg_remote::Cdns;

#[derive(Subcommand)]
pub enum InspectTarget {
    /// Distinct (build config, CDN config) pairs of a remote
    Builds { remote: String },

    /// Distinct CDN configs over remotes (all remotes when none given)
    Cdns { remotes: Vec<String> },

    /// Known versions of a remote, ascending by build id
    Versions { remote: String },
}

/// Choose the CDN to mirror from: the first preferred name that exists,
/// otherwise the first listed.
fn select_cdn<'a>(cdns: &'a [Cdns], preferred: &[String]) -> Option<&'a Cdns> {
    preferred
        .iter()
        .find_map(|name| cdns.iter().find(|c| &c.name == name))
        .or_else(|| cdns.first())
}

pub async fn fetch(
    keg: &Keg,
    remotes: &[String],
    metadata_only: bool,
    concurrency: usize,
) -> anyhow::Result<()> {
    let remotes: Vec<String> = if remotes.is_empty() {
        keg.config.fetchable_remotes()
    } else {
        remotes.iter().map(|r| keg.clean_remote(r)).collect()
    };
    if remotes.is_empty() {
        println!("Nothing to fetch: no remotes given and none marked default-fetch.");
        return Ok(());
    }

    keg.clean_temp()?;

    for remote_url in remotes {
        println!("Fetching {remote_url}");
        let remote = keg.get_remote(&remote_url)?;

        let versions = remote.get_versions().await?;
        let cdns = remote.get_cdns().await?;
        let Some(cdn) = select_cdn(&cdns, keg.config.preferred_cdns()) else {
            warn!("{remote_url} lists no CDNs, skipping");
            continue;
        };
        let server = cdn
            .all_servers()
            .into_iter()
            .next()
            .context("CDN row has neither servers nor hosts")?;
        let remote_cdn = RemoteCdn::new(&server, &cdn.path, &cdn.config_path)?;

        let mut seen = HashSet::new();
        for version in versions {
            if !seen.insert((version.build_config.clone(), version.cdn_config.clone())) {
                continue;
            }

            let label = format!(
                "{} ({})",
                version.versions_name, &version.build_config
            );
            let verify = keg.config.verify_integrity();
            let mut fetcher = Fetcher::new(version, &keg.local_cdn, &remote_cdn, verify);

            let result = if metadata_only {
                fetch_metadata(&mut fetcher, concurrency).await
            } else {
                fetcher.fetch_all(concurrency).await.map_err(Into::into)
            };

            // A gap in one historical build must not stop the sweep.
            match result {
                Ok(count) => println!("  {label}: {count} objects fetched"),
                Err(e) => println!("  {label}: skipped ({e:#})"),
            }
        }
    }

    Ok(())
}

/// Walk drains up to (not including) the data phase.
async fn fetch_metadata(fetcher: &mut Fetcher<'_>, concurrency: usize) -> anyhow::Result<u64> {
    use futures_util::{StreamExt, TryStreamExt, stream};

    let mut fetched = 0u64;
    while let Some(drain) = fetcher.next_drain()? {
        if drain.phase == Phase::Data {
            break;
        }
        fetched += drain.len() as u64;
        stream::iter(drain.directives.iter().map(|d| fetcher.fetch(d)))
            .buffer_unordered(concurrency.max(1))
            .try_collect::<Vec<()>>()
            .await?;
    }
    Ok(fetched)
}

pub fn inspect(keg: &Keg, target: &InspectTarget) -> anyhow::Result<()> {
    match target {
        InspectTarget::Builds { remote } => {
            let remote = keg.clean_remote(remote);
            for (build_config, cdn_config) in keg.db.get_build_configs(Some(&remote))? {
                println!("{build_config} {cdn_config}");
            }
        }
        InspectTarget::Cdns { remotes } => {
            let remotes: Vec<String> = remotes.iter().map(|r| keg.clean_remote(r)).collect();
            for cdn_config in keg.db.get_cdn_configs(&remotes)? {
                println!("{cdn_config}");
            }
        }
        InspectTarget::Versions { remote } => {
            let remote = keg.clean_remote(remote);
            for (build_config, build_id, versions_name) in keg.db.get_versions(&remote)? {
                println!("{build_id:>8}  {versions_name:<24}  {build_config}");
            }
        }
    }
    Ok(())
}

/// Re-verify every object in the store against its own name.
pub fn verify(keg: &Keg) -> anyhow::Result<()> {
    let objects = keg.path().join("objects");
    let mut checked = 0u64;
    let mut failed = 0u64;

    for space in ["config", "configs/data"] {
        walk_objects(&objects.join(space), &mut |key, path| {
            checked += 1;
            let data = std::fs::read(path)?;
            if keg_cdn::verify_data("object", &data, key).is_err() {
                failed += 1;
                println!("FAIL {space}/{key}");
            }
            Ok(())
        })?;
    }

    for space in ["data", "patch"] {
        let root = objects.join(space);
        walk_objects(&root, &mut |name, path| {
            checked += 1;
            if let Some(key) = name.strip_suffix(".index") {
                // Index: the footer hashes to the name.
                let data = std::fs::read(path)?;
                let ok = data.len() >= 28
                    && keg_cdn::verify_data("index", &data[data.len() - 28..], key).is_ok();
                if !ok {
                    failed += 1;
                    println!("FAIL {space}/{name}");
                }
            } else if path.with_file_name(format!("{name}.index")).exists() {
                // Archive: addressed through its index, the body has no
                // digest of its own.
            } else {
                let f = std::fs::File::open(path)?;
                if keg_blte::verify_stream(f, name).is_err() {
                    failed += 1;
                    println!("FAIL {space}/{name}");
                }
            }
            Ok(())
        })?;
    }

    println!("{checked} objects checked, {failed} failed");
    if failed > 0 {
        anyhow::bail!("{failed} objects failed verification");
    }
    Ok(())
}

/// Apply `f(file_name, path)` to every file under `root`.
fn walk_objects(
    root: &Path,
    f: &mut dyn FnMut(&str, &Path) -> anyhow::Result<()>,
) -> anyhow::Result<()> {
    if !root.exists() {
        return Ok(());
    }
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            walk_objects(&path, f)?;
        } else if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if !name.ends_with(".keg_temp") {
                f(name, &path)?;
            }
        }
    }
    Ok(())
}
