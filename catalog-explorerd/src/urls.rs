use url::Url;
use shared::protocol::TOKEN_PARAM;
use crate::error::Result;

/// A user-supplied catalog URL split into its canonical form and any token it carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedUrl {
    pub url: String,
    pub token: Option<String>,
}

/// Canonicalize a base URL: trim whitespace, drop the fragment, the `f` and `token`
/// parameters and trailing slashes.
pub fn normalize_base_url(input: &str) -> Result<NormalizedUrl> {
    let mut url = Url::parse(input.trim())?;
    url.set_fragment(None);

    let mut token = None;
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter_map(|(k, v)| {
            if k == TOKEN_PARAM {
                token = Some(v.into_owned());
                None
            } else if k == "f" {
                None
            } else {
                Some((k.into_owned(), v.into_owned()))
            }
        })
        .collect();

    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }

    let path = url.path().trim_end_matches('/').to_string();
    url.set_path(&path);

    let url = if url.query().is_none() {
        url.as_str().trim_end_matches('/').to_string()
    } else {
        url.to_string()
    };

    Ok(NormalizedUrl {
        url,
        token: token.filter(|t| !t.is_empty()),
    })
}

/// Remove a `token` parameter from a URL so it can be shown or used as a cache key.
pub fn strip_token(input: &str) -> String {
    match normalize_base_url(input) {
        Ok(normalized) => normalized.url,
        Err(_) => input.to_string(),
    }
}

/// The `scheme://host[:port]` key tokens are stored under.
pub fn origin_key(input: &str) -> Result<String> {
    let url = Url::parse(input)?;
    Ok(url.origin().ascii_serialization())
}

/// Append path segments to a base URL, keeping any query string after the path.
pub fn join(base: &str, segments: &[&str]) -> String {
    let parts = segments
        .iter()
        .flat_map(|segment| segment.split('/'))
        .filter(|segment| !segment.is_empty());

    match Url::parse(base) {
        Ok(mut url) if !url.cannot_be_a_base() => {
            if let Ok(mut path) = url.path_segments_mut() {
                path.pop_if_empty().extend(parts);
            }
            url.to_string()
        }
        _ => {
            let mut out = base.trim_end_matches('/').to_string();
            for part in parts {
                out.push('/');
                out.push_str(part);
            }
            out
        }
    }
}
