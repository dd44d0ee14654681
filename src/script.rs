use crate::config::{Config, DEFAULT_DEDUPE_WINDOW_SECS, DEFAULT_PING_INTERVAL_SECS};
use serde_json::json;

/// Constants baked into the served tracking script.
#[derive(Debug, Clone)]
pub struct ScriptOptions {
    pub dedupe_window_ms: u64,
    pub ping_interval_ms: u64,
    pub dashboard_hosts: Vec<String>,
    pub allow_local: bool,
}

impl Default for ScriptOptions {
    fn default() -> Self {
        Self {
            dedupe_window_ms: DEFAULT_DEDUPE_WINDOW_SECS * 1000,
            ping_interval_ms: DEFAULT_PING_INTERVAL_SECS * 1000,
            dashboard_hosts: Vec::new(),
            allow_local: false,
        }
    }
}

impl From<&Config> for ScriptOptions {
    fn from(config: &Config) -> Self {
        Self {
            dedupe_window_ms: config.dedupe_window.as_millis() as u64,
            ping_interval_ms: config.ping_interval.as_millis() as u64,
            dashboard_hosts: config.dashboard_hosts.clone(),
            allow_local: config.allow_local,
        }
    }
}

/// Renders the self-contained tracking script for one site.
///
/// Every injected value goes through `serde_json`, so the output is valid
/// JavaScript whatever the site id or endpoint contains.
pub fn build_script(site_id: Option<&str>, endpoint: &str, options: &ScriptOptions) -> String {
    let site_id = site_id.map(str::trim).filter(|id| !id.is_empty());
    let endpoint = endpoint.trim_end_matches('/');
    let values = [
        ("SITE_ID", json!(site_id).to_string()),
        ("TRACK_URL", json!(format!("{endpoint}/api/track")).to_string()),
        ("DEDUPE_WINDOW_MS", options.dedupe_window_ms.to_string()),
        ("PING_INTERVAL_MS", options.ping_interval_ms.to_string()),
        ("DASHBOARD_HOSTS", json!(options.dashboard_hosts).to_string()),
        ("ALLOW_LOCAL", options.allow_local.to_string()),
    ];
    render(TRACKER_JS, &values)
}

/// Fills `{{NAME}}` tokens in a single left-to-right pass. Substituted text
/// is never scanned again, so values may contain anything.
fn render(template: &str, values: &[(&str, String)]) -> String {
    let mut out = String::with_capacity(template.len() + 256);
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };
        let name = &after[..end];
        match values.iter().find(|(key, _)| *key == name) {
            Some((_, value)) => out.push_str(&value.replace("</", "<\\/")),
            None => out.push_str(&rest[start..start + 2 + end + 2]),
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    out
}

const TRACKER_JS: &str = r#"(function () {
  'use strict';

  var SITE_ID = {{SITE_ID}};
  var TRACK_URL = {{TRACK_URL}};
  var DEDUPE_WINDOW_MS = {{DEDUPE_WINDOW_MS}};
  var PING_INTERVAL_MS = {{PING_INTERVAL_MS}};
  var DASHBOARD_HOSTS = {{DASHBOARD_HOSTS}};
  var ALLOW_LOCAL = {{ALLOW_LOCAL}};
  var DASHBOARD_PATHS = ['/dashboard', '/analytics'];
  var LOOPBACK_HOSTS = ['localhost', '127.0.0.1'];
  var SOFT_CAP = 100;
  var START_DELAY_MS = 100;
  var ACTIVITY_DEBOUNCE_MS = 1000;
  var CURRENT_SCRIPT = document.currentScript;

  function log(message) {
    if (window.console && console.debug) {
      console.debug('[site-tracker] ' + message);
    }
  }

  function storageGet(key) {
    try { return window.localStorage.getItem(key); } catch (e) { return null; }
  }

  function storageSet(key, value) {
    try { window.localStorage.setItem(key, value); } catch (e) { /* storage disabled */ }
  }

  function resolveSiteId() {
    if (SITE_ID) {
      return SITE_ID;
    }
    var script = CURRENT_SCRIPT || document.querySelector('script[data-site-id]');
    var fromTag = script && script.getAttribute('data-site-id');
    if (fromTag) {
      storageSet('site_tracker_id', fromTag);
      return fromTag;
    }
    return storageGet('site_tracker_id');
  }

  function allowLocal() {
    return ALLOW_LOCAL || storageGet('site_tracker_allow_local') === 'true';
  }

  function hasDashboardPath(path) {
    for (var i = 0; i < DASHBOARD_PATHS.length; i++) {
      if (path.indexOf(DASHBOARD_PATHS[i]) !== -1) { return true; }
    }
    return false;
  }

  function isDashboardHost(host) {
    for (var i = 0; i < DASHBOARD_HOSTS.length; i++) {
      var known = DASHBOARD_HOSTS[i];
      if (host === known || host.slice(-(known.length + 1)) === '.' + known) { return true; }
    }
    return false;
  }

  function isDashboardUrl(url) {
    try {
      var parsed = new URL(url, window.location.href);
      var host = parsed.hostname.toLowerCase();
      var path = parsed.pathname.toLowerCase();
      if (isDashboardHost(host)) { return true; }
      if (hasDashboardPath(path)) { return true; }
      if (!allowLocal() && LOOPBACK_HOSTS.indexOf(host) !== -1) {
        return path === '/' || path.indexOf('/dashboard') !== -1;
      }
      return false;
    } catch (e) {
      var lowered = String(url).toLowerCase();
      if (!allowLocal()) {
        for (var i = 0; i < LOOPBACK_HOSTS.length; i++) {
          if (lowered.indexOf(LOOPBACK_HOSTS[i]) !== -1) { return true; }
        }
      }
      for (var j = 0; j < DASHBOARD_HOSTS.length; j++) {
        if (lowered.indexOf(DASHBOARD_HOSTS[j]) !== -1) { return true; }
      }
      return hasDashboardPath(lowered);
    }
  }

  var lastSeen = {};
  var lastSeenCount = 0;

  function isDuplicate(url, now) {
    var seen = lastSeen[url];
    if (seen === undefined) {
      var stored = Number(storageGet('site_tracker_last:' + url));
      seen = stored > 0 ? stored : undefined;
    }
    return seen !== undefined && now - seen < DEDUPE_WINDOW_MS;
  }

  function markProcessed(url, now) {
    if (lastSeen[url] === undefined) { lastSeenCount++; }
    lastSeen[url] = now;
    storageSet('site_tracker_last:' + url, String(now));
    if (lastSeenCount > SOFT_CAP) {
      for (var key in lastSeen) {
        if (Object.prototype.hasOwnProperty.call(lastSeen, key) && now - lastSeen[key] > 2 * DEDUPE_WINDOW_MS) {
          delete lastSeen[key];
          lastSeenCount--;
        }
      }
    }
  }

  function buildEvent(siteId, eventType) {
    return {
      siteId: siteId,
      url: window.location.href,
      referrer: document.referrer || '',
      userAgent: navigator.userAgent || '',
      screenWidth: (window.screen && window.screen.width) || 0,
      screenHeight: (window.screen && window.screen.height) || 0,
      pageTitle: document.title || '',
      timestamp: new Date().toISOString(),
      eventType: eventType,
      isPing: eventType === 'session_ping'
    };
  }

  function sendPixel(event) {
    var params = [];
    for (var key in event) {
      if (Object.prototype.hasOwnProperty.call(event, key)) {
        params.push(encodeURIComponent(key) + '=' + encodeURIComponent(event[key]));
      }
    }
    var img = new Image(1, 1);
    img.src = TRACK_URL + '?' + params.join('&');
    return { success: true, method: 'pixel' };
  }

  function deliver(event) {
    var body = JSON.stringify(event);
    try {
      if (navigator.sendBeacon && navigator.sendBeacon(TRACK_URL, new Blob([body], { type: 'text/plain' }))) {
        return Promise.resolve({ success: true, method: 'beacon' });
      }
    } catch (e) {
      log('beacon failed: ' + e);
    }
    if (!window.fetch) {
      return Promise.resolve(sendPixel(event));
    }
    return window.fetch(TRACK_URL, {
      method: 'POST',
      keepalive: true,
      headers: { 'Content-Type': 'application/json' },
      body: body
    }).then(function (response) {
      if (!response.ok) { throw new Error('status ' + response.status); }
      return { success: true, method: 'fetch' };
    }).catch(function (e) {
      log('fetch failed, using pixel: ' + e);
      try {
        return sendPixel(event);
      } catch (pixelError) {
        log('all delivery methods failed: ' + pixelError);
        return { success: false, error: String(pixelError) };
      }
    });
  }

  function trackPageView(siteId) {
    var url = window.location.href;
    if (isDashboardUrl(url)) { log('dashboard page, not tracking'); return; }
    var now = Date.now();
    if (isDuplicate(url, now)) { log('duplicate page view suppressed'); return; }
    markProcessed(url, now);
    deliver(buildEvent(siteId, 'page_view'));
  }

  var lastPing = 0;

  function maybePing(siteId) {
    var now = Date.now();
    if (now - lastPing < PING_INTERVAL_MS) { return; }
    if (isDashboardUrl(window.location.href)) { return; }
    deliver(buildEvent(siteId, 'session_ping')).then(function () {
      lastPing = now;
    });
  }

  function watchNavigation(onChange) {
    var current = window.location.href;
    function check() {
      if (window.location.href !== current) {
        current = window.location.href;
        onChange();
      }
    }
    ['pushState', 'replaceState'].forEach(function (name) {
      var original = history[name];
      if (typeof original !== 'function') { return; }
      history[name] = function () {
        var result = original.apply(this, arguments);
        check();
        return result;
      };
    });
    window.addEventListener('popstate', check);
    if (window.MutationObserver && document.body) {
      new MutationObserver(check).observe(document.body, { childList: true, subtree: true });
    }
  }

  function start() {
    var siteId = resolveSiteId();
    if (!siteId) {
      log('no site-id configured, tracking disabled');
      return;
    }
    trackPageView(siteId);
    maybePing(siteId);
    watchNavigation(function () { trackPageView(siteId); });

    setInterval(function () { maybePing(siteId); }, PING_INTERVAL_MS);
    document.addEventListener('visibilitychange', function () {
      if (document.visibilityState === 'visible') { maybePing(siteId); }
    });
    var debounce = null;
    ['click', 'scroll', 'keypress', 'mousemove'].forEach(function (name) {
      window.addEventListener(name, function () {
        clearTimeout(debounce);
        debounce = setTimeout(function () { maybePing(siteId); }, ACTIVITY_DEBOUNCE_MS);
      }, { passive: true });
    });
  }

  try {
    setTimeout(function () {
      try { start(); } catch (e) { log('tracker failed to start: ' + e); }
    }, START_DELAY_MS);
  } catch (e) {
    log('tracker failed to schedule: ' + e);
  }
})();
"#;
