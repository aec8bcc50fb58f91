//! Scripted stand-in for the external tools the pipeline drives.
//!
//! `FakeToolchain` records every invocation and answers the way `lipo`,
//! `hdiutil`, `codesign`, `notarytool`, `cmake` and friends would, without
//! touching the host. Mounting creates a real directory under `volumes` so
//! the disk image code can populate it.

#![allow(dead_code)]

use async_trait::async_trait;
use desktop_ci_actions::bundler::{Invocation, ProcessOutput, ProcessRunner, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Fake implementation of every tool used by the pipeline.
#[derive(Debug)]
pub struct FakeToolchain {
    volumes: PathBuf,
    archs: Option<String>,
    installed_bundle: Option<String>,
    notarization_status: String,
    calls: Mutex<Vec<Invocation>>,
    failures: Mutex<HashMap<String, u32>>,
    always_fail: Mutex<Vec<String>>,
}

impl FakeToolchain {
    /// Toolchain mounting volumes below `volumes`.
    pub fn new(volumes: &Path) -> Self {
        Self {
            volumes: volumes.to_path_buf(),
            archs: None,
            installed_bundle: None,
            notarization_status: "Accepted".to_string(),
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            always_fail: Mutex::new(Vec::new()),
        }
    }

    /// What `lipo -archs` reports. By default a merged binary reports
    /// `x86_64 arm64` and any other file reports its own contents.
    pub fn with_archs(mut self, archs: &str) -> Self {
        self.archs = Some(archs.to_string());
        self
    }

    /// Make `cmake --install` create `<prefix>/<name>.app` for the arch
    /// named by the prefix directory.
    pub fn installing(mut self, name: &str) -> Self {
        self.installed_bundle = Some(name.to_string());
        self
    }

    /// Final notarization status.
    pub fn with_notarization_status(mut self, status: &str) -> Self {
        self.notarization_status = status.to_string();
        self
    }

    /// Fail the first `times` invocations of `operation` (e.g. `"hdiutil create"`).
    pub fn fail_times(self, operation: &str, times: u32) -> Self {
        self.failures.lock().unwrap().insert(operation.to_string(), times);
        self
    }

    /// Fail every invocation whose command line contains `needle`.
    pub fn fail_matching(self, needle: &str) -> Self {
        self.always_fail.lock().unwrap().push(needle.to_string());
        self
    }

    /// Every invocation so far.
    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    /// Displayed command lines of every invocation so far.
    pub fn command_lines(&self) -> Vec<String> {
        self.calls().iter().map(Invocation::display).collect()
    }

    /// Number of invocations of `operation`.
    pub fn count(&self, operation: &str) -> usize {
        self.calls().iter().filter(|c| operation_of(c) == operation).count()
    }

    fn should_fail(&self, invocation: &Invocation) -> bool {
        let line = invocation.display();
        if self.always_fail.lock().unwrap().iter().any(|n| line.contains(n.as_str())) {
            return true;
        }
        let mut failures = self.failures.lock().unwrap();
        match failures.get_mut(&operation_of(invocation)) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }

    fn respond(&self, invocation: &Invocation) -> ProcessOutput {
        let args = invocation.arguments();
        match operation_of(invocation).as_str() {
            "lipo -create" => {
                let output = value_after(args, "-output");
                let sources = args.len().saturating_sub(3);
                std::fs::write(output, format!("fat binary of {sources}")).unwrap();
                ProcessOutput::success("")
            }
            "lipo -archs" => {
                let archs = self.archs.clone().unwrap_or_else(|| {
                    let contents = std::fs::read_to_string(&args[1]).unwrap_or_default();
                    if contents.starts_with("fat binary") {
                        "x86_64 arm64".to_string()
                    } else {
                        contents
                    }
                });
                ProcessOutput::success(format!("{archs}\n"))
            }
            "cmake --install" => {
                if let Some(name) = &self.installed_bundle {
                    let prefix = Path::new(value_after(args, "--prefix"));
                    let arch = match prefix.file_name().and_then(|n| n.to_str()) {
                        Some("x64") => "x86_64",
                        Some(other) => other,
                        None => "arm64",
                    };
                    make_bundle(prefix, name, arch);
                }
                ProcessOutput::success("")
            }
            "hdiutil attach" => {
                let image = Path::new(&args[1]);
                let name = image.file_stem().unwrap().to_string_lossy().into_owned();
                let mount_point = self.volumes.join(name);
                std::fs::create_dir_all(&mount_point).unwrap();
                ProcessOutput::success(format!(
                    "/dev/disk4\tGUID_partition_scheme\t\n/dev/disk4s1\tApple_HFS\t{}\n",
                    mount_point.display()
                ))
            }
            "hdiutil detach" => {
                let _ = std::fs::remove_dir_all(&args[1]);
                ProcessOutput::success("")
            }
            "hdiutil convert" => {
                std::fs::write(value_after(args, "-o"), b"compressed image").unwrap();
                ProcessOutput::success("")
            }
            "otool -L" => ProcessOutput::success(format!(
                "{}:\n\t@rpath/lib-strings.dylib (compatibility version 0.0.0)\n\t/usr/lib/libc++.1.dylib (x)\n",
                args[1]
            )),
            "otool -l" => ProcessOutput::success("         path @executable_path/../Frameworks (offset 12)\n"),
            "xcrun notarytool" if args.get(1).map(String::as_str) == Some("submit") => {
                ProcessOutput::success(format!(
                    "Conducting pre-submission checks...\n{{\"id\":\"sub-1\",\"status\":\"{}\",\"message\":\"done\"}}",
                    self.notarization_status
                ))
            }
            "conan --version" => ProcessOutput::success("Conan version 2.0.13\n"),
            "clang -dumpversion" | "gcc -dumpfullversion" => ProcessOutput::success("15.0.0\n"),
            "git show" => ProcessOutput::success("abc1234\n"),
            _ => ProcessOutput::success(""),
        }
    }
}

#[async_trait]
impl ProcessRunner for FakeToolchain {
    async fn execute(&self, invocation: &Invocation) -> Result<ProcessOutput> {
        self.calls.lock().unwrap().push(invocation.clone());
        if self.should_fail(invocation) {
            return Ok(ProcessOutput::failure(1, format!("{} failed", operation_of(invocation))));
        }
        Ok(self.respond(invocation))
    }
}

/// `"<program> <first argument>"`.
pub fn operation_of(invocation: &Invocation) -> String {
    match invocation.arguments().first() {
        Some(first) => format!("{} {}", invocation.program(), first),
        None => invocation.program().to_string(),
    }
}

fn value_after<'a>(args: &'a [String], flag: &str) -> &'a str {
    let index = args.iter().position(|a| a == flag).unwrap();
    &args[index + 1]
}

/// Write `contents` to `path`, creating parent directories.
pub fn write_file(path: &Path, contents: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

/// Minimal single-architecture bundle:
///
/// ```text
/// Audio.app/Contents/MacOS/Audio
/// Audio.app/Contents/Frameworks/libwx.dylib
/// Audio.app/Contents/Frameworks/libwx.1.dylib -> libwx.dylib
/// Audio.app/Contents/modules/mod-script.so
/// Audio.app/Contents/Resources/a.txt
/// Audio.app/Contents/Info.plist
/// ```
pub fn make_bundle(dir: &Path, name: &str, arch: &str) -> PathBuf {
    let bundle = dir.join(format!("{name}.app"));
    write_file(&bundle.join(format!("Contents/MacOS/{name}")), arch);
    write_file(&bundle.join("Contents/Frameworks/libwx.dylib"), arch);
    write_file(&bundle.join("Contents/modules/mod-script.so"), arch);
    write_file(&bundle.join("Contents/Resources/a.txt"), "resource");
    write_file(&bundle.join("Contents/Info.plist"), &info_plist("3.4.2", "org.example.audio"));
    #[cfg(unix)]
    std::os::unix::fs::symlink("libwx.dylib", bundle.join("Contents/Frameworks/libwx.1.dylib")).unwrap();
    bundle
}

/// XML Info.plist with the given version and identifier.
pub fn info_plist(version: &str, identifier: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>CFBundleVersion</key>
    <string>{version}</string>
    <key>CFBundleIdentifier</key>
    <string>{identifier}</string>
</dict>
</plist>
"#
    )
}
