use url::Url;

const DASHBOARD_PATHS: [&str; 2] = ["/dashboard", "/analytics"];
const LOOPBACK_HOSTS: [&str; 2] = ["localhost", "127.0.0.1"];

/// Decides whether a URL belongs to the analytics dashboard itself, which must
/// never be tracked, or to an instrumented client site.
///
/// The rules are heuristic and path/host based. A client site whose root page
/// is served from a loopback host is skipped unless `allow_local` is set.
#[derive(Debug, Clone, Default)]
pub struct UrlClassifier {
    dashboard_hosts: Vec<String>,
    allow_local: bool,
}

impl UrlClassifier {
    pub fn new(dashboard_hosts: Vec<String>, allow_local: bool) -> Self {
        let dashboard_hosts = dashboard_hosts
            .into_iter()
            .map(|host| host.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|host| !host.is_empty())
            .collect();
        Self {
            dashboard_hosts,
            allow_local,
        }
    }

    pub fn is_dashboard_url(&self, url: &str) -> bool {
        let trimmed = url.trim();
        if is_relative(trimmed) {
            let path = trimmed.split(['?', '#']).next().unwrap_or_default();
            return has_dashboard_path(&path.to_ascii_lowercase());
        }
        match Url::parse(trimmed) {
            Ok(parsed) if parsed.has_host() => self.classify(&parsed),
            _ => self.matches_marker(trimmed),
        }
    }

    fn classify(&self, url: &Url) -> bool {
        let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
        let path = url.path().to_ascii_lowercase();

        if self.is_dashboard_host(&host) {
            return true;
        }

        if has_dashboard_path(&path) {
            return true;
        }

        if !self.allow_local && LOOPBACK_HOSTS.contains(&host.as_str()) {
            return path == "/" || path.contains("/dashboard");
        }

        false
    }

    fn is_dashboard_host(&self, host: &str) -> bool {
        self.dashboard_hosts.iter().any(|known| {
            host == known
                || host
                    .strip_suffix(known.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }

    fn matches_marker(&self, url: &str) -> bool {
        let lowered = url.to_ascii_lowercase();
        let loopback = !self.allow_local && LOOPBACK_HOSTS.iter().any(|m| lowered.contains(m));
        loopback
            || has_dashboard_path(&lowered)
            || self
                .dashboard_hosts
                .iter()
                .any(|host| lowered.contains(host.as_str()))
    }
}

/// Relative inputs such as `/dashboard/orders` carry no host, so only the
/// path rules apply to them.
fn is_relative(url: &str) -> bool {
    url.starts_with('/') && !url.starts_with("//")
}

fn has_dashboard_path(path: &str) -> bool {
    DASHBOARD_PATHS.iter().any(|marker| path.contains(marker))
}
