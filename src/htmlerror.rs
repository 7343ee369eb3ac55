//! `{name}` variable substitution for error pages and the stats template
//! (SPEC_FULL.md supplement; spec.md 4.J calls this engine without
//! specifying the substitution syntax beyond naming the later, `{name}`,
//! engine — see spec.md §9 design notes).

use std::collections::HashMap;

/// Replace every `{key}` occurrence in `template` with its value from
/// `vars`. Unknown keys are left untouched — a stray `{foo}` in a
/// hand-edited template shouldn't silently vanish.
pub fn substitute(template: &str, vars: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 1..];
        match after_open.find('}') {
            Some(close) => {
                let key = &after_open[..close];
                match vars.get(key) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push('{');
                        out.push_str(key);
                        out.push('}');
                    }
                }
                rest = &after_open[close + 1..];
            }
            None => {
                out.push('{');
                rest = after_open;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Default inline error page used when no `ErrorFile`/`DefaultErrorFile`
/// is configured for the status in question.
pub fn default_error_page(vars: &HashMap<String, String>) -> String {
    let tpl = "<html><head><title>{errno} {cause}</title></head><body>\n\
               <h1>{cause}</h1>\n\
               <p>{detail}</p>\n\
               <hr><address>{package}/{version}</address>\n\
               </body></html>\n";
    substitute(tpl, vars)
}

/// The canonical error-page variable bag, per spec.md 4.J.
pub fn error_vars(
    errno: u16,
    cause: &str,
    detail: &str,
    url: &str,
    clientip: &str,
) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    vars.insert("errno".into(), errno.to_string());
    vars.insert("cause".into(), cause.to_string());
    vars.insert("detail".into(), detail.to_string());
    vars.insert("url".into(), url.to_string());
    vars.insert("clientip".into(), clientip.to_string());
    vars.insert(
        "date".into(),
        humantime::format_rfc3339_seconds(std::time::SystemTime::now()).to_string(),
    );
    vars.insert("version".into(), env!("CARGO_PKG_VERSION").to_string());
    vars.insert("package".into(), "tinyrelay".to_string());
    vars.insert("website".into(), "https://example.invalid/tinyrelay".to_string());
    vars
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_known_keys() {
        let mut vars = HashMap::new();
        vars.insert("errno".to_string(), "403".to_string());
        let out = substitute("error {errno}", &vars);
        assert_eq!(out, "error 403");
    }

    #[test]
    fn leaves_unknown_keys_untouched() {
        let vars = HashMap::new();
        let out = substitute("hello {nope}", &vars);
        assert_eq!(out, "hello {nope}");
    }

    #[test]
    fn default_page_includes_detail() {
        let vars = error_vars(403, "Forbidden", "denied by ACL", "/x", "1.2.3.4");
        let page = default_error_page(&vars);
        assert!(page.contains("denied by ACL"));
        assert!(page.contains("403"));
    }
}
