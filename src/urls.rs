//! Remote project URLs derived from the destination base URL.
//!
//! Every URL is composed with `Url::join`. The base URL is treated as a
//! directory, so `https://host/gitlab` and `https://host/gitlab/` resolve
//! the same way. A namespace that starts with `/` is absolute and replaces
//! the base path.

use url::{ParseError, Url};

/// Path segment appended to a project URL to reach its settings page
const SETTINGS_SEGMENT: &str = "edit";

/// Suffix of the push target for a project
const GIT_SUFFIX: &str = ".git";

/// URL of the namespace (group) that will own the new project
pub fn namespace_url(base: &Url, namespace: &str) -> Result<Url, ParseError> {
    directory_base(base).join(&namespace_path(namespace))
}

/// Push target used for push-to-create, `<namespace>/<project>.git`.
/// `project_name` is taken as is, the same as for the display URL.
pub fn project_push_url(
    base: &Url,
    namespace: &str,
    project_name: &str,
) -> Result<Url, ParseError> {
    join_relative(
        &namespace_url(base, namespace)?,
        &format!("{project_name}{GIT_SUFFIX}"),
    )
}

/// Human-facing project URL, without the `.git` suffix
pub fn project_display_url(
    base: &Url,
    namespace: &str,
    project_name: &str,
) -> Result<Url, ParseError> {
    join_relative(&namespace_url(base, namespace)?, project_name)
}

pub fn project_settings_url(
    base: &Url,
    namespace: &str,
    project_name: &str,
) -> Result<Url, ParseError> {
    join_relative(
        &namespace_url(base, namespace)?,
        &format!("{project_name}/{SETTINGS_SEGMENT}"),
    )
}

/// All URLs for one project, resolved together so a bad combination fails early
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteUrls {
    pub namespace: Url,
    pub push: Url,
    pub display: Url,
    pub settings: Url,
}

impl RemoteUrls {
    pub fn resolve(base: &Url, namespace: &str, project_name: &str) -> Result<Self, ParseError> {
        Ok(Self {
            namespace: namespace_url(base, namespace)?,
            push: project_push_url(base, namespace, project_name)?,
            display: project_display_url(base, namespace, project_name)?,
            settings: project_settings_url(base, namespace, project_name)?,
        })
    }
}

fn directory_base(base: &Url) -> Url {
    let mut dir = base.clone();
    if !dir.path().ends_with('/') {
        let path = format!("{}/", dir.path());
        dir.set_path(&path);
    }
    dir
}

/// Namespace as a relative (or absolute) directory reference ending in `/`.
/// Empty segments are dropped so no `//` reaches the joined URL.
fn namespace_path(namespace: &str) -> String {
    let mut path = if namespace.trim_start().starts_with('/') {
        String::from("/")
    } else {
        String::from("./")
    };
    for segment in namespace.split('/').map(str::trim).filter(|s| !s.is_empty()) {
        path.push_str(segment);
        path.push('/');
    }
    path
}

// The "./" prefix keeps a segment such as "a:b" from being parsed as a scheme.
fn join_relative(dir: &Url, relative: &str) -> Result<Url, ParseError> {
    dir.join(&format!("./{relative}"))
}
