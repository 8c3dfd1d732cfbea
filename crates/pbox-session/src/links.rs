//! Links between viewer pages.

use url::{form_urlencoded, Url};

use crate::SessionError;

/// Route of the viewer page.
pub const VIEWER_PATH: &str = "/examples/view";

/// Query-encode `value`, keeping `/` readable and spaces as `+`.
#[must_use]
pub fn encode_query_value(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace("%2F", "/")
}

/// Viewer link in the combined `path=<dir>/<name>` form.
///
/// A jsbin editor URL is reduced to its bin id.
#[must_use]
pub fn example_url(dir: &str, name: &str, jsbin: Option<&str>) -> String {
    let mut url = format!(
        "{VIEWER_PATH}?path={}",
        encode_query_value(&format!("{dir}/{name}"))
    );
    if let Some(id) = jsbin.map(jsbin_id).filter(|id| !id.is_empty()) {
        url.push_str("&jsbin=");
        url.push_str(&encode_query_value(id));
    }
    url
}

/// Viewer link in the `d`/`f`/`t` form. Values are passed through as
/// already encoded. The title is omitted when it merely restates the file.
#[must_use]
pub fn legacy_example_url(dir: &str, file: &str, title: Option<&str>, jsbin: Option<&str>) -> String {
    let mut url = format!("{VIEWER_PATH}?d={dir}&f={file}");
    if let Some(jsbin) = jsbin.filter(|j| !j.is_empty()) {
        url.push_str("&jsbin=");
        url.push_str(jsbin);
    }
    if let Some(title) = title.filter(|t| !t.is_empty()) {
        if format!("{}.js", title.replace(' ', "+")) != file {
            url.push_str("&t=");
            url.push_str(title);
        }
    }
    url
}

/// Rewrite the `v` parameter of `current` to select `tag`.
///
/// Choosing `default_tag` removes the parameter. Other parameters keep
/// their order.
///
/// # Errors
///
/// Returns an error when `current` is not an absolute URL.
pub fn version_switch_url(current: &str, tag: &str, default_tag: &str) -> Result<String, SessionError> {
    let mut url = Url::parse(current)?;
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "v")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    if tag != default_tag {
        pairs.push(("v".to_string(), tag.to_string()));
    }

    let query = pairs
        .iter()
        .map(|(key, value)| format!("{}={}", encode_query_value(key), encode_query_value(value)))
        .collect::<Vec<_>>()
        .join("&");
    url.set_query((!query.is_empty()).then_some(query.as_str()));
    Ok(url.to_string())
}

fn jsbin_id(jsbin: &str) -> &str {
    const PREFIXES: [&str; 2] = ["http://jsbin.com/", "https://jsbin.com/"];
    for prefix in PREFIXES {
        if jsbin.len() >= prefix.len()
            && jsbin.is_char_boundary(prefix.len())
            && jsbin[..prefix.len()].eq_ignore_ascii_case(prefix)
        {
            let rest = &jsbin[prefix.len()..];
            return rest.split('/').next().unwrap_or(rest);
        }
    }
    jsbin
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_like_a_readable_query() {
        assert_eq!(encode_query_value("games/space invaders"), "games/space+invaders");
        assert_eq!(encode_query_value("a&b=c"), "a%26b%3Dc");
    }

    #[test]
    fn builds_combined_links() {
        assert_eq!(
            example_url("games", "breakout", None),
            "/examples/view?path=games/breakout"
        );
        assert_eq!(
            example_url("games", "breakout", Some("http://jsbin.com/abc/edit?js,output")),
            "/examples/view?path=games/breakout&jsbin=abc"
        );
    }

    #[test]
    fn builds_legacy_links() {
        assert_eq!(
            legacy_example_url("games", "space+invaders.js", Some("space invaders"), None),
            "/examples/view?d=games&f=space+invaders.js"
        );
        assert_eq!(
            legacy_example_url("games", "tanks.js", Some("Tank Battle"), Some("xyz")),
            "/examples/view?d=games&f=tanks.js&jsbin=xyz&t=Tank Battle"
        );
    }

    #[test]
    fn switches_versions() -> anyhow::Result<()> {
        let page = "http://localhost:3000/examples/view?path=games/breakout#top";
        let switched = version_switch_url(page, "v2.4.0", "master")?;
        assert_eq!(
            switched,
            "http://localhost:3000/examples/view?path=games/breakout&v=v2.4.0#top"
        );

        let back = version_switch_url(&switched, "master", "master")?;
        assert_eq!(
            back,
            "http://localhost:3000/examples/view?path=games/breakout#top"
        );
        Ok(())
    }

    #[test]
    fn switching_to_default_without_query_drops_the_question_mark() -> anyhow::Result<()> {
        let switched = version_switch_url("http://h/examples/view?v=dev", "master", "master")?;
        assert_eq!(switched, "http://h/examples/view");
        Ok(())
    }
}
