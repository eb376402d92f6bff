// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Locating the property list embedded in a provisioning profile.

A `.mobileprovision` file is a CMS `SignedData` structure whose encapsulated
content is an XML property list. Rather than walking the DER structure, the
marker scan looks for the `<?xml` declaration and reads the 2 byte length
that immediately precedes it.
*/

use {
    crate::error::ProvisioningError,
    cryptographic_message_syntax::SignedData,
    log::{debug, warn},
    serde::{Deserialize, Serialize},
};

const XML_MARKER: &[u8] = b"<?xml";
const PLIST_END: &[u8] = b"</plist>";

/// Strategy for pulling the property list out of provisioning profile bytes.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PayloadExtraction {
    /// Scan for the `<?xml` marker and its length prefix.
    #[default]
    MarkerScan,

    /// Decode the CMS envelope, falling back to a marker scan on failure.
    Cms,
}

/// Extract the property list text from provisioning profile bytes.
pub fn extract_payload(
    raw: &[u8],
    extraction: PayloadExtraction,
) -> Result<String, ProvisioningError> {
    match extraction {
        PayloadExtraction::MarkerScan => locate(raw),
        PayloadExtraction::Cms => match cms_signed_content(raw) {
            Some(text) => Ok(text),
            None => locate(raw),
        },
    }
}

/// Locate the embedded property list by scanning for the `<?xml` marker.
///
/// The 2 bytes before the marker hold the big-endian length of the text.
/// Distribution profiles have been observed to declare a length one byte too
/// long, so the text is cut back to its last `>`. The declared length is
/// clamped to the buffer and, when the result does not end with the closing
/// `</plist>`, the closing element found after the marker wins.
pub fn locate(raw: &[u8]) -> Result<String, ProvisioningError> {
    let start = find_marker(raw).ok_or(ProvisioningError::MarkerNotFound)?;

    let declared = ((raw[start - 2] as usize) << 8) | raw[start - 1] as usize;
    let end = start.saturating_add(declared).min(raw.len());

    if start + declared > raw.len() {
        warn!(
            "declared plist length {} runs past end of data; clamping to {}",
            declared,
            raw.len() - start
        );
    }

    let text = truncate_to_last_tag(String::from_utf8_lossy(&raw[start..end]).into_owned());

    if text.trim_end().ends_with("</plist>") {
        return Ok(text);
    }

    if let Some(close) = find_subslice(&raw[start..], PLIST_END) {
        let close_end = start + close + PLIST_END.len();
        debug!(
            "declared plist length {} disagrees with closing tag at offset {}; using closing tag",
            declared, close_end
        );

        return Ok(String::from_utf8_lossy(&raw[start..close_end]).into_owned());
    }

    Ok(text)
}

/// Obtain the encapsulated content of a CMS `SignedData` structure as text.
fn cms_signed_content(raw: &[u8]) -> Option<String> {
    let signed_data = match SignedData::parse_ber(raw) {
        Ok(v) => v,
        Err(e) => {
            debug!("unable to decode CMS envelope ({}); falling back to marker scan", e);
            return None;
        }
    };

    let content = signed_data.signed_content()?;

    match String::from_utf8(content.to_vec()) {
        Ok(text) => Some(text),
        Err(_) => {
            debug!("CMS content is not UTF-8; falling back to marker scan");
            None
        }
    }
}

fn find_marker(raw: &[u8]) -> Option<usize> {
    raw.windows(XML_MARKER.len())
        .enumerate()
        .skip(2)
        .find(|(_, window)| *window == XML_MARKER)
        .map(|(offset, _)| offset)
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn truncate_to_last_tag(mut text: String) -> String {
    match text.rfind('>') {
        Some(pos) => text.truncate(pos + 1),
        None => text.clear(),
    }

    text
}
