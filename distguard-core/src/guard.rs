//! Domain guard injection
//!
//! Every protected script starts with a small self-invoking function that checks
//! `window.location.hostname` against the whitelist. On an unauthorized host it
//! wipes the page, shows a notice, disables event listeners and keeps throwing.

use crate::whitelist::DomainWhitelist;

const DOMAINS_PLACEHOLDER: &str = "__AUTHORIZED_DOMAINS__";

const GUARD_TEMPLATE: &str = r#"(function () {
  var authorizedDomains = __AUTHORIZED_DOMAINS__;
  function isAuthorizedHost(hostname) {
    var host = String(hostname || "").toLowerCase().replace(/\.$/, "");
    for (var index = 0; index < authorizedDomains.length; index++) {
      var domain = authorizedDomains[index];
      if (host === domain || host.slice(-(domain.length + 1)) === "." + domain) {
        return true;
      }
    }
    return false;
  }
  function lockDown() {
    var root = document.documentElement;
    if (document.head) {
      document.head.innerHTML = "";
    }
    if (!document.body) {
      root.appendChild(document.createElement("body"));
    }
    document.body.innerHTML = "";
    var notice = document.createElement("div");
    notice.style.cssText = "position:fixed;top:0;left:0;width:100%;height:100%;background:#f00;color:#fff;display:flex;justify-content:center;align-items:center;font-size:24px;text-align:center;z-index:9999;";
    notice.textContent = "Unauthorized access detected. This code is protected against theft.";
    document.body.appendChild(notice);
    var disabled = function () {};
    window.addEventListener = disabled;
    window.removeEventListener = disabled;
    document.addEventListener = disabled;
    document.removeEventListener = disabled;
    setInterval(function () {
      throw new Error("UNAUTHORIZED_ACCESS_DETECTED");
    }, 100);
    return false;
  }
  try {
    if (isAuthorizedHost(window.location.hostname)) {
      return true;
    }
    return lockDown();
  } catch (failure) {
    console.error("Domain verification failed:", failure);
    try {
      return lockDown();
    } catch (ignored) {
      return false;
    }
  }
})();"#;

/// Local identifiers of the guard, which renaming is expected to replace
pub const GUARD_LOCALS: &[&str] = &[
    "authorizedDomains",
    "isAuthorizedHost",
    "lockDown",
    "notice",
];

/// The guard code for `whitelist`; identical whitelists give identical text
pub fn guard_snippet(whitelist: &DomainWhitelist) -> String {
    GUARD_TEMPLATE.replace(DOMAINS_PLACEHOLDER, &whitelist.to_json())
}

/// Prefix `payload` with the guard, followed by a line break
pub fn inject(payload: &str, whitelist: &DomainWhitelist) -> String {
    let snippet = guard_snippet(whitelist);
    let mut out = String::with_capacity(snippet.len() + 1 + payload.len());
    out.push_str(&snippet);
    out.push('\n');
    out.push_str(payload);
    out
}

/// Undo [`inject`] for the same whitelist, returning the original payload
pub fn strip_guard<'a>(text: &'a str, whitelist: &DomainWhitelist) -> Option<&'a str> {
    text.strip_prefix(guard_snippet(whitelist).as_str())?
        .strip_prefix('\n')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obfuscator::lexer::tokenize;

    #[test]
    fn test_snippet_embeds_whitelist() {
        let snippet = guard_snippet(&DomainWhitelist::default());
        assert!(snippet.contains(r#"["localhost","zoomie.io"]"#));
        assert!(snippet.contains("UNAUTHORIZED_ACCESS_DETECTED"));
        assert!(snippet.contains("Unauthorized access detected."));
        assert!(!snippet.contains(DOMAINS_PLACEHOLDER));
    }

    #[test]
    fn test_snippet_is_deterministic() {
        let whitelist = DomainWhitelist::new(["example.com"]).unwrap();
        assert_eq!(guard_snippet(&whitelist), guard_snippet(&whitelist));
        assert_ne!(
            guard_snippet(&whitelist),
            guard_snippet(&DomainWhitelist::default())
        );
    }

    #[test]
    fn test_inject_is_prefix() {
        let whitelist = DomainWhitelist::default();
        let payload = "console.log(1)";
        let injected = inject(payload, &whitelist);
        assert!(injected.starts_with(&guard_snippet(&whitelist)));
        assert!(injected.ends_with(payload));
        assert_eq!(strip_guard(&injected, &whitelist), Some(payload));
    }

    #[test]
    fn test_inject_empty_payload() {
        let whitelist = DomainWhitelist::default();
        let injected = inject("", &whitelist);
        assert_eq!(injected, format!("{}\n", guard_snippet(&whitelist)));
        assert_eq!(strip_guard(&injected, &whitelist), Some(""));
    }

    #[test]
    fn test_strip_guard_needs_same_whitelist() {
        let injected = inject("x()", &DomainWhitelist::default());
        let other = DomainWhitelist::new(["example.com"]).unwrap();
        assert_eq!(strip_guard(&injected, &other), None);
        assert_eq!(strip_guard("x()", &DomainWhitelist::default()), None);
    }

    #[test]
    fn test_snippet_tokenizes() {
        let tokens = tokenize(&guard_snippet(&DomainWhitelist::default())).unwrap();
        for local in GUARD_LOCALS {
            assert!(tokens.iter().any(|t| t.text == *local), "missing {local}");
        }
    }
}
