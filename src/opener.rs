use crate::error::{OpnError, Result};
use crate::launcher::Launcher;
use crate::model::{Candidate, Resource, Target};
use crate::resolver::Resolver;
use crate::selector::{DownloadState, Outcome, Prompt, Selector};
use crate::sources::exec::{ExecValue, FieldValues};
use crate::sources::sniff;
use log::{debug, info, warn};
use regex::Regex;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static SCHEME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z][A-Za-z0-9+.-]*):").expect("scheme pattern is valid")
});

const DOWNLOADABLE_SCHEMES: [&str; 2] = ["http", "https"];

/// How the command line argument should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    File,
    Url,
    /// A URL when it carries a scheme, a path otherwise.
    Unknown,
}

pub fn parse_resource(input: &str, kind: ResourceKind) -> Result<Resource> {
    let scheme = SCHEME_RE
        .captures(input)
        .map(|caps| caps[1].to_lowercase());

    match (kind, scheme) {
        (ResourceKind::File, _) | (ResourceKind::Unknown, None) => {
            Ok(Resource::File(PathBuf::from(input)))
        }
        (ResourceKind::Url, None) => Err(OpnError::InvalidUrl(input.to_string())),
        (ResourceKind::Url | ResourceKind::Unknown, Some(scheme)) => Ok(Resource::Url {
            url: input.to_string(),
            scheme,
        }),
    }
}

/// MIME type of a local file: the `user.mime` attribute unless the file was
/// downloaded by us, then the system's detection tools.
pub fn detect_mime(path: &Path, downloaded: bool) -> Result<String> {
    if !downloaded {
        if let Some(mime) = sniff::xattr_mime(path) {
            debug!("Using user.mime attribute of {:?}: {}", path, mime);
            return Ok(mime);
        }
    }
    sniff::file_mime(path)
}

#[derive(Debug, Clone)]
struct RemoteUrl {
    url: String,
    scheme: String,
    downloadable: bool,
}

/// What is being opened, updated in place when a URL gets downloaded.
#[derive(Debug, Clone)]
struct ResourceState {
    mime_override: Option<String>,
    local_file: Option<PathBuf>,
    local_mime: Option<String>,
    downloaded: bool,
    remote: Option<RemoteUrl>,
}

impl ResourceState {
    fn new(resource: Resource, mime_override: Option<String>) -> Self {
        let (local_file, remote) = match resource {
            Resource::File(path) => (Some(path), None),
            Resource::Url { url, scheme } => {
                let downloadable = DOWNLOADABLE_SCHEMES.contains(&scheme.as_str());
                (
                    None,
                    Some(RemoteUrl {
                        url,
                        scheme,
                        downloadable,
                    }),
                )
            }
        };

        Self {
            mime_override,
            local_file,
            local_mime: None,
            downloaded: false,
            remote,
        }
    }

    fn update_local_mime(&mut self) -> Result<()> {
        let Some(path) = &self.local_file else {
            self.local_mime = None;
            return Ok(());
        };
        if self.mime_override.is_some() || self.local_mime.is_some() {
            return Ok(());
        }
        self.local_mime = Some(detect_mime(path, self.downloaded)?);
        Ok(())
    }

    fn mimes(&self) -> Vec<String> {
        let mut mimes: Vec<String> = self
            .mime_override
            .clone()
            .or_else(|| self.local_mime.clone())
            .into_iter()
            .collect();

        if let Some(remote) = &self.remote {
            if !self.downloaded {
                mimes.push(format!("x-scheme-handler/{}", remote.scheme));
            }
        }
        mimes
    }

    fn target(&self) -> Target {
        match (&self.local_file, &self.remote) {
            (None, Some(remote)) => Target::Url {
                downloadable: remote.downloadable,
            },
            _ => Target::LocalFile,
        }
    }

    fn download_state(&self) -> DownloadState {
        match &self.remote {
            None => DownloadState::NotUrl,
            Some(_) if self.downloaded => DownloadState::AlreadyDownloaded,
            Some(remote) if !remote.downloadable => DownloadState::Unsupported,
            Some(_) => DownloadState::Available,
        }
    }

    fn hint(&self) -> String {
        match (&self.local_file, &self.remote) {
            (Some(path), _) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.to_string_lossy().into_owned()),
            (None, Some(remote)) => remote.url.clone(),
            (None, None) => String::new(),
        }
    }

    fn download(&mut self) -> Result<()> {
        let Some(remote) = &self.remote else {
            return Err(OpnError::Download {
                url: String::new(),
                message: "URL is not set".to_string(),
            });
        };
        if !remote.downloadable {
            return Err(OpnError::Download {
                url: remote.url.clone(),
                message: format!("downloading is not supported for the scheme {}", remote.scheme),
            });
        }

        let (path, content_type) = download_to_temp(&remote.url)?;
        self.local_file = Some(path);
        self.local_mime = content_type;
        self.downloaded = true;
        self.update_local_mime()
    }

    /// The local path if there is one, the URL otherwise.
    fn argument(&self) -> String {
        match (&self.local_file, &self.remote) {
            (Some(path), _) => path.to_string_lossy().into_owned(),
            (None, Some(remote)) => remote.url.clone(),
            (None, None) => String::new(),
        }
    }

    /// Expands the chosen exec. Programs that insist on local paths get the
    /// URL downloaded first.
    fn arguments(&mut self, candidate: &Candidate, exec: &ExecValue) -> Result<Vec<String>> {
        if exec.uses_file_codes() && self.local_file.is_none() {
            self.download()?;
        }

        debug!("Expanding '{}' of {}", exec.raw(), candidate.desktop_id);
        let argument = self.argument();
        let values = FieldValues {
            files: self
                .local_file
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect(),
            urls: vec![argument.clone()],
            name: candidate.name().to_string(),
            icon: candidate.entry.icon.clone(),
            location: candidate.entry_path.to_string_lossy().into_owned(),
        };
        let mut argv = exec.to_arguments(&values);

        if !exec.can_open_files() {
            warn!(
                "{} does not explicitly declare support for opening a file. \
                 It is missing a field code in the Exec value. \
                 The path will be added as last argument.",
                candidate.desktop_id
            );
            argv.push(argument);
        }
        Ok(argv)
    }
}

/// Fetches the URL into a kept `opn_download*` temp file. Returns the path
/// and the MIME type announced by the server.
fn download_to_temp(url: &str) -> Result<(PathBuf, Option<String>)> {
    let download_error = |message: String| OpnError::Download {
        url: url.to_string(),
        message,
    };

    info!("Downloading {}", url);
    let response = match ureq::get(url).call() {
        Ok(response) => response,
        Err(ureq::Error::Status(code, response)) => {
            return Err(download_error(format!(
                "bad status {} {}",
                code,
                response.status_text()
            )));
        }
        Err(ureq::Error::Transport(e)) => return Err(download_error(e.to_string())),
    };
    let content_type = response
        .header("Content-Type")
        .and_then(sniff::content_type_mime);

    let mut temp = tempfile::Builder::new().prefix("opn_download").tempfile()?;
    io::copy(&mut response.into_reader(), temp.as_file_mut())
        .map_err(|e| download_error(format!("error writing downloaded content: {}", e)))?;
    let (_, path) = temp.keep().map_err(|e| e.error)?;

    debug!("Downloaded {} to {:?} ({:?})", url, path, content_type);
    Ok((path, content_type))
}

/// Opens a file or URL: resolves candidates, asks which one to use and
/// launches it.
pub struct Opener<'a> {
    resolver: Resolver<'a>,
    selector: &'a Selector,
    launcher: &'a Launcher,
}

impl<'a> Opener<'a> {
    pub fn new(resolver: Resolver<'a>, selector: &'a Selector, launcher: &'a Launcher) -> Self {
        Self {
            resolver,
            selector,
            launcher,
        }
    }

    pub fn open<R: BufRead, W: Write>(
        &self,
        resource: Resource,
        mime_override: Option<String>,
        input: &mut R,
        output: &mut W,
    ) -> Result<()> {
        let mut state = ResourceState::new(resource, mime_override);
        state.update_local_mime()?;
        let mut candidates = self.resolver.resolve(&state.mimes(), state.target())?;

        let selection = loop {
            let hint = state.hint();
            let prompt = Prompt {
                hint: &hint,
                download: state.download_state(),
            };
            match self.selector.choose(&prompt, &candidates, input, output)? {
                Outcome::Launch(selection) => break selection,
                Outcome::Quit | Outcome::Closed => return Ok(()),
                Outcome::Download => {
                    state.download()?;
                    candidates = self.resolver.resolve(&state.mimes(), state.target())?;
                }
            }
        };

        let candidate = &candidates[selection.main];
        let exec = candidate
            .exec(selection.action)
            .unwrap_or(&candidate.entry.exec);
        let argv = state.arguments(candidate, exec)?;

        let needs_terminal = candidate.entry.terminal;
        let mode = self.launcher.start_mode(selection.mode, needs_terminal);
        self.launcher.launch(argv, needs_terminal, mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StartModeDefaults;
    use crate::index::Index;
    use crate::sources::DesktopFileParser;
    use crate::sources::desktop::{IdPathMap, parse_desktop_file};
    use crate::sources::mimeapps::Associations;
    use crate::sources::mimeinfo::SubclassTable;
    use chrono::Local;
    use std::fs;
    use std::io::Cursor;

    fn candidate(exec: &str) -> Candidate {
        let entry =
            parse_desktop_file(&format!("[Desktop Entry]\nName=Viewer\nExec={exec}\nIcon=viewer\n"))
                .unwrap();
        Candidate {
            desktop_id: "viewer.desktop".into(),
            entry_path: PathBuf::from("/apps/viewer.desktop"),
            entry,
            actions: Vec::new(),
        }
    }

    fn url_state(url: &str) -> ResourceState {
        ResourceState::new(parse_resource(url, ResourceKind::Url).unwrap(), None)
    }

    #[test]
    fn resource_kinds() {
        assert_eq!(
            parse_resource("notes.txt", ResourceKind::Unknown).unwrap(),
            Resource::File("notes.txt".into())
        );
        assert_eq!(
            parse_resource("HTTPS://example.com/a.pdf", ResourceKind::Unknown).unwrap(),
            Resource::Url {
                url: "HTTPS://example.com/a.pdf".into(),
                scheme: "https".into()
            }
        );
        assert_eq!(
            parse_resource("mailto:me@example.com", ResourceKind::File).unwrap(),
            Resource::File("mailto:me@example.com".into())
        );
        assert!(matches!(
            parse_resource("/tmp/page.html", ResourceKind::Url),
            Err(OpnError::InvalidUrl(_))
        ));
    }

    #[test]
    fn url_mimes_include_scheme_handler() {
        let state = url_state("https://example.com");
        assert_eq!(state.mimes(), vec!["x-scheme-handler/https"]);
        assert_eq!(state.target(), Target::Url { downloadable: true });
        assert_eq!(state.download_state(), DownloadState::Available);
        assert_eq!(state.hint(), "https://example.com");

        let ftp = url_state("ftp://example.com/file");
        assert_eq!(ftp.target(), Target::Url { downloadable: false });
        assert_eq!(ftp.download_state(), DownloadState::Unsupported);
    }

    #[test]
    fn override_comes_first() {
        let state = ResourceState::new(
            parse_resource("https://example.com", ResourceKind::Url).unwrap(),
            Some("text/html".into()),
        );
        assert_eq!(state.mimes(), vec!["text/html", "x-scheme-handler/https"]);
    }

    #[test]
    fn override_skips_detection_of_local_files() {
        let mut state = ResourceState::new(
            Resource::File("/nonexistent/opn/page.html".into()),
            Some("text/html".into()),
        );
        state.update_local_mime().unwrap();
        assert_eq!(state.mimes(), vec!["text/html"]);
        assert_eq!(state.target(), Target::LocalFile);
        assert_eq!(state.download_state(), DownloadState::NotUrl);
        assert_eq!(state.hint(), "page.html");
    }

    #[test]
    fn downloaded_url_behaves_like_local_file() {
        let mut state = url_state("https://example.com/report");
        state.local_file = Some("/tmp/opn_download123".into());
        state.local_mime = Some("application/pdf".into());
        state.downloaded = true;

        assert_eq!(state.mimes(), vec!["application/pdf"]);
        assert_eq!(state.target(), Target::LocalFile);
        assert_eq!(state.download_state(), DownloadState::AlreadyDownloaded);
    }

    #[test]
    fn arguments_for_local_file() {
        let mut state = ResourceState::new(Resource::File("/tmp/a b.txt".into()), None);
        let viewer = candidate("viewer --name %c %i %f");

        let argv = state.arguments(&viewer, &viewer.entry.exec).unwrap();

        assert_eq!(
            argv,
            vec!["viewer", "--name", "Viewer", "--icon", "viewer", "/tmp/a b.txt"]
        );
    }

    #[test]
    fn url_codes_receive_the_url() {
        let mut state = url_state("https://example.com");
        let browser = candidate("browser %U");
        assert_eq!(
            state.arguments(&browser, &browser.entry.exec).unwrap(),
            vec!["browser", "https://example.com"]
        );
    }

    #[test]
    fn resource_is_appended_without_field_codes() {
        let mut state = ResourceState::new(Resource::File("/tmp/a.txt".into()), None);
        let plain = candidate("plain --read-only");
        assert_eq!(
            state.arguments(&plain, &plain.entry.exec).unwrap(),
            vec!["plain", "--read-only", "/tmp/a.txt"]
        );
    }

    #[test]
    fn file_codes_on_undownloadable_url_fail() {
        let mut state = url_state("ftp://example.com/file");
        let viewer = candidate("viewer %f");
        assert!(matches!(
            state.arguments(&viewer, &viewer.entry.exec),
            Err(OpnError::Download { .. })
        ));
    }

    struct World {
        _dir: tempfile::TempDir,
        index: Index,
        hierarchy: SubclassTable,
    }

    fn world(exec: &str) -> World {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tool.desktop");
        fs::write(&path, format!("[Desktop Entry]\nName=Tool\nExec={exec}\n")).unwrap();

        let mut associations = Associations::new();
        associations.insert("text/x-opn-test".into(), vec!["tool.desktop".into()]);
        let mut paths = IdPathMap::new();
        paths.insert(
            "tool.desktop".into(),
            vec![path.to_string_lossy().into_owned()],
        );

        World {
            _dir: dir,
            index: Index::new(associations, paths, Local::now()),
            hierarchy: SubclassTable::default(),
        }
    }

    fn open_with(world: &World, input: &str) -> (Result<()>, String) {
        let resolver = Resolver::new(&world.index, &world.hierarchy, &DesktopFileParser);
        let selector = Selector::new(StartModeDefaults::default());
        let launcher = Launcher::new(StartModeDefaults::default(), None, || false);
        let opener = Opener::new(resolver, &selector, &launcher);

        let mut output = Vec::new();
        let result = opener.open(
            Resource::File("/tmp/opn-test-input".into()),
            Some("text/x-opn-test".into()),
            &mut Cursor::new(input.as_bytes().to_vec()),
            &mut output,
        );
        (result, String::from_utf8(output).unwrap())
    }

    #[test]
    fn chosen_program_is_launched_attached() {
        let (result, output) = open_with(&world("true %f"), "0a\n");
        result.unwrap();
        assert!(output.contains("0) Tool"));
        assert!(output.contains("Open opn-test-input with (?=help)[0]: "));

        let (result, _) = open_with(&world("false %f"), "a\n");
        assert!(matches!(result, Err(OpnError::ExitStatus { .. })));
    }

    #[test]
    fn quitting_launches_nothing() {
        let (result, _) = open_with(&world("false %f"), "q\n");
        result.unwrap();
        let (result, _) = open_with(&world("false %f"), "");
        result.unwrap();
    }

    #[test]
    fn unassociated_mime_is_reported() {
        let w = world("true %f");
        let resolver = Resolver::new(&w.index, &w.hierarchy, &DesktopFileParser);
        let selector = Selector::new(StartModeDefaults::default());
        let launcher = Launcher::new(StartModeDefaults::default(), None, || false);
        let opener = Opener::new(resolver, &selector, &launcher);

        let err = opener
            .open(
                Resource::File("/tmp/x".into()),
                Some("image/x-nothing".into()),
                &mut Cursor::new(Vec::new()),
                &mut Vec::new(),
            )
            .unwrap_err();
        assert!(matches!(err, OpnError::NoApplication { .. }));
    }
}
