//! Shared fixtures: a throwaway project whose external tools are shell
//! scripts recording their invocations in `calls.log`.

#![allow(dead_code)]

use kodegen_bundler_pipeline::bundler::{
    Result, Settings, SettingsBuilder, StalenessPolicy, utils::http::Downloader,
};
use std::{
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, SystemTime},
};
use tempfile::TempDir;

/// File name of the fake runtime image; the URL's last segment.
pub const RUNTIME_IMAGE: &str = "python3.9.1-cp39-cp39-manylinux2014_x86_64.AppImage";

/// Which parts of the pipeline file a fixture enables.
#[derive(Clone, Copy, Debug)]
pub struct Layout {
    pub macos: bool,
    pub linux: bool,
    /// The fake runtime ships its own desktop entry and AppStream file.
    pub runtime_metadata: bool,
    /// The fake bundler leaves two copies of QtCore.framework.
    pub duplicate_frameworks: bool,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            macos: true,
            linux: true,
            runtime_metadata: true,
            duplicate_frameworks: true,
        }
    }
}

pub struct Project {
    _dir: TempDir,
    root: PathBuf,
    log: PathBuf,
}

impl Project {
    pub fn new() -> Self {
        Self::with_layout(Layout::default())
    }

    pub fn with_layout(layout: Layout) -> Self {
        Self::in_dir("project", layout)
    }

    /// A project in a directory named `name` inside the temp dir.
    pub fn in_dir(name: &str, layout: Layout) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join(name);
        let log = root.join("calls.log");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(&log, "").unwrap();

        write(&root.join("resources.qrc"), QRC);
        write(&root.join("runekit/alt1/alt1.js"), "window.alt1 = {};\n");
        write(&root.join("runekit/image/runekit.png"), "png");
        write(&root.join("runekit/__init__.py"), "");
        write(&root.join("runekit/app.py"), "def main():\n    pass\n");
        write(&root.join("main.py"), "from runekit.app import main\nmain()\n");
        write(&root.join("poetry.lock"), "# lock\n");
        write(&root.join("deploy/runekit.desktop"), "[Desktop Entry]\nName=RuneKit\n");
        write(&root.join("deploy/runekit.appdata.xml"), "<component/>\n");
        write(&root.join("deploy/AppRun"), "#!/bin/sh\n# launcher\nexec python3.9 -m runekit\n");

        let tools = root.join("tools");
        tool(&tools.join("pyside2-rcc"), &rcc(&log));
        tool(&tools.join("poetry"), &poetry(&log));
        tool(
            &tools.join("pyinstaller"),
            &pyinstaller(&log, layout.duplicate_frameworks),
        );
        tool(&tools.join("codesign"), &logger(&log, "codesign"));
        tool(&tools.join("appimagetool"), &appimagetool(&log));
        tool(
            &tools.join(RUNTIME_IMAGE),
            &runtime_image(&log, layout.runtime_metadata),
        );

        let mut config = format!(
            r#"[project]
name = "runekit"
app_name = "RuneKit"
version = "0.1.0"
sources = ["runekit/**/*.py"]

[resources]
manifest = "resources.qrc"
output = "runekit/_resources.py"
compiler = ["{tools}/pyside2-rcc"]

[sdist]
command = ["{tools}/poetry", "build", "-f", "sdist"]
lock_file = "poetry.lock"
tool_output = "dist/runekit-*.tar.gz"
artifact = "runekit.tar.gz"
"#,
            tools = tools.display()
        );
        if layout.macos {
            config.push_str(&format!(
                r#"
[macos]
entry_script = "main.py"
bundle_identifier = "com.example.runekit"
bundler = ["{tools}/pyinstaller"]

[macos.signing]
command = ["{tools}/codesign"]
"#,
                tools = tools.display()
            ));
        }
        if layout.linux {
            config.push_str(&format!(
                r#"
[linux.runtime]
version = "3.9.1"
url = "{url}"
python = "opt/python3.9/bin/python3.9"

[linux.appimage]
desktop_file = "deploy/runekit.desktop"
appdata_file = "deploy/runekit.appdata.xml"
launcher = "deploy/AppRun"
tool = "{tools}/appimagetool"
"#,
                url = url::Url::from_file_path(tools.join(RUNTIME_IMAGE)).unwrap(),
                tools = tools.display()
            ));
        }
        write(&root.join("packaging.toml"), &config);

        Self {
            _dir: dir,
            root,
            log,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root().join(rel)
    }

    pub fn config(&self) -> PathBuf {
        self.path("packaging.toml")
    }

    pub fn settings(&self) -> Settings {
        SettingsBuilder::new().config_path(self.config()).build().unwrap()
    }

    pub fn settings_with(&self, policy: StalenessPolicy) -> Settings {
        SettingsBuilder::new()
            .config_path(self.config())
            .staleness(policy)
            .build()
            .unwrap()
    }

    /// Rewrites the pipeline file through `edit`.
    pub fn edit_config(&self, edit: impl FnOnce(String) -> String) {
        let text = std::fs::read_to_string(self.config()).unwrap();
        std::fs::write(self.config(), edit(text)).unwrap();
    }

    /// Every recorded tool invocation, in order.
    pub fn calls(&self) -> Vec<String> {
        std::fs::read_to_string(&self.log)
            .unwrap()
            .lines()
            .map(String::from)
            .collect()
    }

    /// Number of invocations of `tool`.
    pub fn count(&self, tool: &str) -> usize {
        self.calls()
            .iter()
            .filter(|line| line.split_whitespace().next() == Some(tool))
            .count()
    }

    pub fn clear_calls(&self) {
        std::fs::write(&self.log, "").unwrap();
    }

    /// Moves the modification time of `rel` into the future.
    pub fn touch(&self, rel: &str) {
        set_mtime(&self.path(rel), SystemTime::now() + Duration::from_secs(30));
    }
}

pub fn write(path: &Path, contents: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

pub fn set_mtime(path: &Path, time: SystemTime) {
    std::fs::File::options()
        .append(true)
        .open(path)
        .unwrap()
        .set_modified(time)
        .unwrap();
}

pub fn mtime(path: &Path) -> SystemTime {
    std::fs::metadata(path).unwrap().modified().unwrap()
}

fn tool(path: &Path, body: &str) {
    write(path, &format!("#!/bin/sh\nset -e\n{body}"));
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

fn logger(log: &Path, name: &str) -> String {
    format!("echo \"{name} $*\" >> '{}'\n", log.display())
}

const QRC: &str = r#"<!DOCTYPE RCC><RCC version="1.0">
<qresource>
    <file>runekit/alt1/alt1.js</file>
    <file>runekit/image/runekit.png</file>
</qresource>
</RCC>
"#;

/// `pyside2-rcc <manifest> -o <out>`; output depends only on the manifest name.
fn rcc(log: &Path) -> String {
    format!(
        "{}echo \"# generated from $(basename \"$1\")\" > \"$3\"\n",
        logger(log, "rcc")
    )
}

/// `poetry build -f sdist`, run from the project root.
fn poetry(log: &Path) -> String {
    format!(
        r#"{}rm -rf build/sdist-tree
mkdir -p build/sdist-tree/runekit-0.1.0/runekit dist
cp runekit/*.py build/sdist-tree/runekit-0.1.0/runekit/
tar -czf dist/runekit-0.1.0.tar.gz -C build/sdist-tree runekit-0.1.0
"#,
        logger(log, "poetry")
    )
}

/// `pyinstaller --noconfirm --distpath D --workpath W <spec>`.
fn pyinstaller(log: &Path, duplicate: bool) -> String {
    let mut body = format!(
        r#"{}app="$3/RuneKit.app/Contents"
mkdir -p "$app/MacOS" "$5"
printf '#!/bin/sh\n' > "$app/MacOS/RuneKit"
printf '<plist/>\n' > "$app/Info.plist"
fw="$app/MacOS/PySide2/Qt/lib/QtCore.framework/Versions/5"
mkdir -p "$fw"
printf 'core' > "$fw/QtCore"
"#,
        logger(log, "pyinstaller")
    );
    if duplicate {
        body.push_str(
            r#"dup="$app/Resources/PySide2/Qt/lib/QtCore.framework/Versions/5"
mkdir -p "$dup"
printf 'core' > "$dup/QtCore"
"#,
        );
    }
    body
}

/// `appimagetool <appdir> <out>`; refuses an AppDir without the launcher.
fn appimagetool(log: &Path) -> String {
    format!(
        r#"echo "appimagetool ARCH=$ARCH $*" >> '{}'
grep -q launcher "$1/AppRun"
printf 'AppImage %s\n' "$ARCH" > "$2"
"#,
        log.display()
    )
}

/// Self-extracting runtime: `--appimage-extract` writes `squashfs-root`.
fn runtime_image(log: &Path, metadata: bool) -> String {
    let mut body = format!(
        r#"[ "$1" = "--appimage-extract" ] || exit 64
{}root=squashfs-root
mkdir -p "$root/opt/python3.9/bin"
printf '#!/bin/sh\necho "python $*" >> "%s"\n' '{}' > "$root/opt/python3.9/bin/python3.9"
chmod 755 "$root/opt/python3.9/bin/python3.9"
ln -s opt/python3.9/bin/python3.9 "$root/AppRun"
"#,
        logger(log, "extract"),
        log.display()
    );
    if metadata {
        body.push_str(
            r#"mkdir -p "$root/usr/share/applications" "$root/usr/share/metainfo"
printf '[Desktop Entry]\n' > "$root/python3.9.1.desktop"
printf '[Desktop Entry]\n' > "$root/usr/share/applications/python3.9.1.desktop"
printf '<component/>\n' > "$root/usr/share/metainfo/python3.9.1.appdata.xml"
"#,
        );
    }
    body
}

/// Downloader counting its calls before delegating to the real one.
#[derive(Clone, Default)]
pub struct CountingDownloader {
    calls: Arc<AtomicUsize>,
}

impl CountingDownloader {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Downloader for CountingDownloader {
    async fn download(&self, url: &str, dest: &Path) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        kodegen_bundler_pipeline::bundler::utils::http::HttpDownloader
            .download(url, dest)
            .await
    }
}
