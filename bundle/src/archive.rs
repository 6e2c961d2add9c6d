use crate::inspect::{self, ProxyEndpoint, TargetEndpoint};
use crate::xml::Element;
use crate::{BundleError, BundleResult};
use std::borrow::Cow;
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Directory names a bundle can be rooted at.
pub const BUNDLE_ROOTS: [&str; 2] = ["apiproxy", "sharedflowbundle"];

/// A temporary working directory for one run. Everything under it is removed
/// when the value is dropped.
pub struct ScratchDir {
    dir: TempDir,
}

impl ScratchDir {
    pub fn new(prefix: &str) -> BundleResult<Self> {
        let dir = tempfile::Builder::new().prefix(prefix).tempdir()?;
        debug!("scratch dir {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Writes `<name>-r<rev>.zip` and extracts it into `proxy-<name>-r<rev>/`.
    pub fn unpack(&self, name: &str, revision: u32, zip: &[u8]) -> BundleResult<Bundle> {
        let zip_path = self.path().join(format!("{}-r{}.zip", name, revision));
        fs::write(&zip_path, zip)?;

        let target = self.path().join(format!("proxy-{}-r{}", name, revision));
        let mut archive = ZipArchive::new(Cursor::new(zip))?;
        archive.extract(&target)?;
        debug!("extracted {} into {}", zip_path.display(), target.display());

        Bundle::open(&target)
    }
}

/// One parsed XML file from a bundle directory.
#[derive(Debug, Clone)]
pub struct BundleFile {
    /// File stem, which by convention is the policy or endpoint name.
    pub name: String,
    pub root: Element,
}

/// An extracted bundle on disk.
#[derive(Debug, Clone)]
pub struct Bundle {
    base: PathBuf,
}

impl Bundle {
    /// Opens a directory that contains `apiproxy/` or `sharedflowbundle/`.
    pub fn open(dir: &Path) -> BundleResult<Self> {
        let base = BUNDLE_ROOTS
            .iter()
            .map(|root| dir.join(root))
            .find(|candidate| candidate.is_dir())
            .ok_or_else(|| BundleError::MissingRoot {
                path: dir.to_path_buf(),
            })?;
        Ok(Self { base })
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn is_shared_flow(&self) -> bool {
        self.base.ends_with("sharedflowbundle")
    }

    fn xml_files(&self, subdir: &str) -> BundleResult<Vec<PathBuf>> {
        let dir = self.base.join(subdir);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut files: Vec<PathBuf> = fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "xml"))
            .collect();
        files.sort();
        Ok(files)
    }

    fn parse_files(&self, subdir: &str) -> BundleResult<Vec<BundleFile>> {
        self.xml_files(subdir)?
            .into_iter()
            .map(|path| {
                let bytes = fs::read(&path)?;
                let text = String::from_utf8_lossy(&bytes);
                if let Cow::Owned(_) = text {
                    warn!("{} is not valid UTF-8, reading it lossily", path.display());
                }
                let root = Element::parse(&text).map_err(|message| BundleError::Xml {
                    file: path.clone(),
                    message,
                })?;
                let name = path
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_default();
                Ok(BundleFile { name, root })
            })
            .collect()
    }

    /// Policy files under `policies/`, sorted by file name.
    pub fn policies(&self) -> BundleResult<Vec<BundleFile>> {
        self.parse_files("policies")
    }

    pub fn proxy_endpoints(&self) -> BundleResult<Vec<ProxyEndpoint>> {
        Ok(self
            .parse_files("proxies")?
            .iter()
            .filter_map(|file| inspect::proxy_endpoint(&file.root))
            .collect())
    }

    pub fn target_endpoints(&self) -> BundleResult<Vec<TargetEndpoint>> {
        Ok(self
            .parse_files("targets")?
            .iter()
            .filter_map(|file| inspect::target_endpoint(&file.root))
            .collect())
    }

    /// Resource references in `<type>://<file>` form, e.g. `java://lib.jar`.
    pub fn resources(&self) -> BundleResult<Vec<String>> {
        let dir = self.base.join("resources");
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut found = Vec::new();
        for type_entry in fs::read_dir(&dir)? {
            let type_path = type_entry?.path();
            if !type_path.is_dir() {
                continue;
            }
            let kind = type_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            for file in fs::read_dir(&type_path)? {
                let file = file?.path();
                if let Some(file_name) = file.file_name() {
                    found.push(format!("{}://{}", kind, file_name.to_string_lossy()));
                }
            }
        }
        found.sort();
        Ok(found)
    }
}

/// Builds a ZIP from in-memory `(path, contents)` entries.
pub fn pack_entries<P, C>(entries: &[(P, C)]) -> BundleResult<Vec<u8>>
where
    P: AsRef<str>,
    C: AsRef<[u8]>,
{
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (path, contents) in entries {
        writer.start_file(path.as_ref().to_string(), options)?;
        writer.write_all(contents.as_ref())?;
    }
    Ok(writer.finish()?.into_inner())
}

/// Zips the bundle found under `source`, with entry paths relative to `source`.
pub fn pack_directory(source: &Path) -> BundleResult<Vec<u8>> {
    let bundle = Bundle::open(source)?;
    let mut entries: Vec<(String, Vec<u8>)> = Vec::new();
    collect_files(source, bundle.base(), &mut entries)?;
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    debug!("packing {} files from {}", entries.len(), source.display());
    pack_entries(&entries)
}

fn collect_files(
    source: &Path,
    dir: &Path,
    entries: &mut Vec<(String, Vec<u8>)>,
) -> BundleResult<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(source, &path, entries)?;
            continue;
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if name.ends_with('~') || name.starts_with(".#") || name == ".DS_Store" {
            continue;
        }
        let relative = path
            .strip_prefix(source)
            .map_err(|_| BundleError::MissingRoot {
                path: path.clone(),
            })?
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        entries.push((relative, fs::read(&path)?));
    }
    Ok(())
}

/// The name declared by the bundle's top-level descriptor, e.g.
/// `apiproxy/orders.xml` holding `<APIProxy name="orders">`.
pub fn declared_name(source: &Path) -> BundleResult<Option<String>> {
    let bundle = Bundle::open(source)?;
    let mut descriptors: Vec<PathBuf> = fs::read_dir(bundle.base())?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "xml"))
        .collect();
    descriptors.sort();

    for path in descriptors {
        let text = fs::read_to_string(&path)?;
        let root = Element::parse(&text).map_err(|message| BundleError::Xml {
            file: path.clone(),
            message,
        })?;
        if root.name == "APIProxy" || root.name == "SharedFlowBundle" {
            return Ok(root.attr("name").map(str::to_string));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_zip() -> Vec<u8> {
        pack_entries(&[
            (
                "apiproxy/orders.xml",
                r#"<APIProxy name="orders"><Description/></APIProxy>"#,
            ),
            (
                "apiproxy/policies/FC-Auth.xml",
                r#"<FlowCallout name="FC-Auth"><SharedFlowBundle>sf1</SharedFlowBundle></FlowCallout>"#,
            ),
            (
                "apiproxy/policies/AM-Response.xml",
                r#"<AssignMessage name="AM-Response"><Set><Payload>ok</Payload></Set></AssignMessage>"#,
            ),
            (
                "apiproxy/proxies/default.xml",
                r#"<ProxyEndpoint name="default"><HTTPProxyConnection><BasePath>/orders</BasePath><VirtualHost>secure</VirtualHost></HTTPProxyConnection></ProxyEndpoint>"#,
            ),
            (
                "apiproxy/targets/default.xml",
                r#"<TargetEndpoint name="default"><HTTPTargetConnection><URL>https://backend</URL></HTTPTargetConnection></TargetEndpoint>"#,
            ),
            ("apiproxy/resources/java/helper.jar", "not really a jar"),
        ])
        .unwrap()
    }

    #[test]
    fn test_non_utf8_policy_is_read_lossily() {
        let zip = pack_entries(&[
            ("apiproxy/orders.xml", b"<APIProxy name=\"orders\"/>".to_vec()),
            (
                "apiproxy/policies/AM-Latin1.xml",
                b"<AssignMessage name=\"AM-Latin1\"><Set><Payload>caf\xe9</Payload></Set></AssignMessage>".to_vec(),
            ),
            (
                "apiproxy/policies/FC-Auth.xml",
                b"<FlowCallout name=\"FC-Auth\"><SharedFlowBundle>sf1</SharedFlowBundle></FlowCallout>".to_vec(),
            ),
        ])
        .unwrap();
        let scratch = ScratchDir::new("bundle-test").unwrap();
        let bundle = scratch.unpack("orders", 1, &zip).unwrap();

        let policies = bundle.policies().unwrap();
        let names: Vec<&str> = policies.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["AM-Latin1", "FC-Auth"]);
        assert_eq!(
            policies[0].root.find_text("Set/Payload"),
            Some("caf\u{fffd}")
        );
    }

    #[test]
    fn test_unpack_and_read() {
        let scratch = ScratchDir::new("bundle-test").unwrap();
        let bundle = scratch.unpack("orders", 3, &sample_zip()).unwrap();

        assert!(scratch.path().join("orders-r3.zip").is_file());
        assert!(scratch.path().join("proxy-orders-r3").is_dir());
        assert!(!bundle.is_shared_flow());

        let policies = bundle.policies().unwrap();
        let names: Vec<&str> = policies.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["AM-Response", "FC-Auth"]);

        let endpoints = bundle.proxy_endpoints().unwrap();
        assert_eq!(endpoints[0].base_path.as_deref(), Some("/orders"));

        let targets = bundle.target_endpoints().unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].ssl_flag(), Some("No SSLInfo"));

        assert_eq!(bundle.resources().unwrap(), vec!["java://helper.jar"]);
    }

    #[test]
    fn test_scratch_dir_removed_on_drop() {
        let scratch = ScratchDir::new("bundle-drop").unwrap();
        let path = scratch.path().to_path_buf();
        scratch.unpack("orders", 1, &sample_zip()).unwrap();
        assert!(path.exists());
        drop(scratch);
        assert!(!path.exists());
    }

    #[test]
    fn test_open_requires_bundle_root() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Bundle::open(dir.path()),
            Err(BundleError::MissingRoot { .. })
        ));

        fs::create_dir_all(dir.path().join("sharedflowbundle")).unwrap();
        let bundle = Bundle::open(dir.path()).unwrap();
        assert!(bundle.is_shared_flow());
        assert!(bundle.policies().unwrap().is_empty());
    }

    #[test]
    fn test_bad_policy_xml_reports_file() {
        let zip = pack_entries(&[("apiproxy/policies/Broken.xml", "<Broken><a></Broken>")]).unwrap();
        let scratch = ScratchDir::new("bundle-bad").unwrap();
        let bundle = scratch.unpack("broken", 1, &zip).unwrap();
        match bundle.policies() {
            Err(BundleError::Xml { file, .. }) => assert!(file.ends_with("Broken.xml")),
            other => panic!("expected xml error, got {:?}", other.map(|p| p.len())),
        }
    }

    #[test]
    fn test_pack_directory_and_declared_name() {
        let dir = tempfile::tempdir().unwrap();
        let policies = dir.path().join("apiproxy").join("policies");
        fs::create_dir_all(&policies).unwrap();
        fs::write(
            dir.path().join("apiproxy").join("orders.xml"),
            r#"<APIProxy name="orders"/>"#,
        )
        .unwrap();
        fs::write(policies.join("AM-1.xml"), "<AssignMessage name=\"AM-1\"/>").unwrap();
        fs::write(policies.join("AM-1.xml~"), "backup").unwrap();

        assert_eq!(declared_name(dir.path()).unwrap().as_deref(), Some("orders"));

        let zip = pack_directory(dir.path()).unwrap();
        let archive = ZipArchive::new(Cursor::new(zip)).unwrap();
        let mut names: Vec<&str> = archive.file_names().collect();
        names.sort();
        assert_eq!(names, vec!["apiproxy/orders.xml", "apiproxy/policies/AM-1.xml"]);
    }
}
