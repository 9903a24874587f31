//! Job configuration patching
//!
//! Rewrites a job's `config.xml` so that the first `<script>` element holds a
//! new pipeline script. Events are streamed through `quick-xml` untouched, so
//! every byte outside the script element is written back as it was read. The
//! XML declaration is cut off before parsing and spliced back verbatim:
//! Jenkins emits `<?xml version='1.1' ...?>` and rejects uploads whose
//! declaration differs.

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, BytesText, Event};
use thiserror::Error;

const SCRIPT_ELEMENT: &[u8] = b"script";

/// Errors raised while patching a job configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatchError {
    /// The document has no `<script>` element to replace
    #[error("Job configuration has no <script> element; is it a pipeline job?")]
    MissingScriptElement,

    /// The document is not well-formed XML
    #[error("Job configuration is not valid XML: {0}")]
    MalformedConfig(String),

    /// Re-serializing the document failed
    #[error("Failed to serialize job configuration: {0}")]
    Serialize(String),
}

/// A job's `config.xml` as fetched from Jenkins
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobConfig {
    document: String,
    header_len: usize,
}

impl JobConfig {
    /// Wraps a raw configuration document
    #[must_use]
    pub fn new(document: impl Into<String>) -> Self {
        let document = document.into();
        let header_len = xml_header_len(&document);
        Self {
            document,
            header_len,
        }
    }

    /// The raw document
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.document
    }

    /// The exact bytes of the XML declaration (empty if there is none)
    #[must_use]
    pub fn original_xml_header(&self) -> &str {
        &self.document[..self.header_len]
    }

    /// Everything after the XML declaration
    #[must_use]
    pub fn body(&self) -> &str {
        &self.document[self.header_len..]
    }

    /// Returns the document with its pipeline script replaced
    ///
    /// # Errors
    ///
    /// Returns [`PatchError::MissingScriptElement`] when no `<script>`
    /// element exists and [`PatchError::MalformedConfig`] when the document
    /// does not parse. No partial output is produced in either case.
    pub fn with_script(&self, script: &str) -> Result<String, PatchError> {
        let body = replace_first_script(self.body(), script)?;
        let mut patched = String::with_capacity(self.header_len + body.len());
        patched.push_str(self.original_xml_header());
        patched.push_str(&body);
        Ok(patched)
    }
}

/// Replaces the pipeline script inside a `config.xml` document
///
/// # Errors
///
/// See [`JobConfig::with_script`].
pub fn patch_pipeline_script(original: &str, script: &str) -> Result<String, PatchError> {
    JobConfig::new(original).with_script(script)
}

/// Length of the leading XML declaration, including an optional BOM
fn xml_header_len(document: &str) -> usize {
    let bom = if document.starts_with('\u{feff}') {
        '\u{feff}'.len_utf8()
    } else {
        0
    };
    if !document[bom..].starts_with("<?xml") {
        return 0;
    }
    document[bom..]
        .find("?>")
        .map_or(0, |end| bom + end + "?>".len())
}

fn is_script(start: &BytesStart<'_>) -> bool {
    start.local_name().as_ref() == SCRIPT_ELEMENT
}

/// Escaped script text, with `\r` written as `&#13;` so it survives line-end
/// normalization on the server
fn script_event(script: &str) -> Event<'static> {
    let escaped = escape(script).replace('\r', "&#13;");
    Event::Text(BytesText::from_escaped(escaped))
}

fn replace_first_script(body: &str, script: &str) -> Result<String, PatchError> {
    let mut reader = Reader::from_str(body);
    let mut writer = Writer::new(Vec::with_capacity(body.len() + script.len()));
    let mut replaced = false;

    loop {
        let event = reader.read_event().map_err(|e| {
            PatchError::MalformedConfig(format!("{e} (near byte {})", reader.buffer_position()))
        })?;

        match event {
            Event::Eof => break,
            Event::Start(start) if !replaced && is_script(&start) => {
                let end = start.to_end().into_owned();
                reader.read_to_end(end.name()).map_err(|e| {
                    PatchError::MalformedConfig(format!("unterminated <script> element: {e}"))
                })?;
                write_event(&mut writer, Event::Start(start))?;
                if !script.is_empty() {
                    write_event(&mut writer, script_event(script))?;
                }
                write_event(&mut writer, Event::End(end))?;
                replaced = true;
            }
            Event::Empty(start) if !replaced && is_script(&start) => {
                if script.is_empty() {
                    write_event(&mut writer, Event::Empty(start))?;
                } else {
                    let end = start.to_end().into_owned();
                    write_event(&mut writer, Event::Start(start))?;
                    write_event(&mut writer, script_event(script))?;
                    write_event(&mut writer, Event::End(end))?;
                }
                replaced = true;
            }
            other => write_event(&mut writer, other)?,
        }
    }

    if !replaced {
        return Err(PatchError::MissingScriptElement);
    }

    String::from_utf8(writer.into_inner()).map_err(|e| PatchError::Serialize(e.to_string()))
}

fn write_event(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), PatchError> {
    writer
        .write_event(event)
        .map_err(|e| PatchError::Serialize(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    const JENKINS_CONFIG: &str = "<?xml version='1.1' encoding='UTF-8'?>
<flow-definition plugin=\"workflow-job@1400.v7fd111b_ec82f\">
  <description>Demo &amp; friends</description>
  <keepDependencies>false</keepDependencies>
  <properties/>
  <definition class=\"org.jenkinsci.plugins.workflow.cps.CpsFlowDefinition\" plugin=\"workflow-cps@3894.vd0f0248b_a_fc4\">
    <script>pipeline { agent any }</script>
    <sandbox>true</sandbox>
  </definition>
  <triggers/>
  <disabled>false</disabled>
</flow-definition>";

    /// Unescaped text of the first `<script>` element
    fn script_text(document: &str) -> String {
        let body = JobConfig::new(document).body().to_string();
        let mut reader = Reader::from_str(&body);
        let mut inside = false;
        let mut text = String::new();
        loop {
            match reader.read_event().unwrap() {
                Event::Start(e) if is_script(&e) => inside = true,
                Event::Empty(e) if is_script(&e) => return String::new(),
                Event::End(e) if inside && e.local_name().as_ref() == SCRIPT_ELEMENT => {
                    return text;
                }
                Event::Text(t) if inside => text.push_str(&t.unescape().unwrap()),
                Event::Eof => panic!("no script element"),
                _ => {}
            }
        }
    }

    #[test]
    fn test_header_is_detected() {
        let config = JobConfig::new(JENKINS_CONFIG);
        assert_eq!(
            config.original_xml_header(),
            "<?xml version='1.1' encoding='UTF-8'?>"
        );
        assert!(config.body().starts_with("\n<flow-definition"));
    }

    #[test]
    fn test_header_absent() {
        let config = JobConfig::new("<project><script/></project>");
        assert_eq!(config.original_xml_header(), "");
    }

    #[test]
    fn test_replaces_only_the_script() {
        let patched = patch_pipeline_script(JENKINS_CONFIG, "echo 'hi' && <b>").unwrap();
        let expected = JENKINS_CONFIG.replace(
            "<script>pipeline { agent any }</script>",
            "<script>echo &apos;hi&apos; &amp;&amp; &lt;b&gt;</script>",
        );
        assert_eq!(patched, expected);
        assert_eq!(script_text(&patched), "echo 'hi' && <b>");
    }

    #[test]
    fn test_preserves_xml_1_1_header() {
        let patched = patch_pipeline_script(JENKINS_CONFIG, "node {}").unwrap();
        assert!(patched.starts_with("<?xml version='1.1' encoding='UTF-8'?>\n<flow-definition"));
    }

    #[test]
    fn test_empty_script_is_allowed() {
        let patched = patch_pipeline_script(JENKINS_CONFIG, "").unwrap();
        assert!(patched.contains("<script></script>"));
        assert_eq!(script_text(&patched), "");
    }

    #[test]
    fn test_self_closing_script_is_filled() {
        let original = "<?xml version='1.1' encoding='UTF-8'?><flow-definition><definition><script/></definition></flow-definition>";
        let patched = patch_pipeline_script(original, "stage('x') {}").unwrap();
        assert_eq!(
            patched,
            "<?xml version='1.1' encoding='UTF-8'?><flow-definition><definition><script>stage(&apos;x&apos;) {}</script></definition></flow-definition>"
        );
    }

    #[test]
    fn test_only_first_script_is_replaced() {
        let original = "<root><a><script>one</script></a><script>two</script></root>";
        let patched = patch_pipeline_script(original, "new").unwrap();
        assert_eq!(
            patched,
            "<root><a><script>new</script></a><script>two</script></root>"
        );
    }

    #[test]
    fn test_nested_markup_inside_script_is_dropped() {
        let original = "<root><script>old<![CDATA[ x ]]><!-- c --></script></root>";
        let patched = patch_pipeline_script(original, "new").unwrap();
        assert_eq!(patched, "<root><script>new</script></root>");
    }

    #[test]
    fn test_missing_script_element() {
        let original = "<?xml version='1.1' encoding='UTF-8'?><project><builders/></project>";
        let err = patch_pipeline_script(original, "node {}").unwrap_err();
        assert_eq!(err, PatchError::MissingScriptElement);
    }

    #[test]
    fn test_malformed_config() {
        let err = patch_pipeline_script("<root><script>x</root>", "y").unwrap_err();
        assert!(matches!(err, PatchError::MalformedConfig(_)));
    }

    #[test]
    fn test_carriage_returns_survive_parsing() {
        let patched = patch_pipeline_script(JENKINS_CONFIG, "node {\r\n  sh 'x'\r\n}\r").unwrap();
        assert!(patched.contains("<script>node {&#13;\n  sh &apos;x&apos;&#13;\n}&#13;</script>"));
        assert!(!patched.contains('\r'));
        assert_eq!(script_text(&patched), "node {\r\n  sh 'x'\r\n}\r");
    }

    #[test]
    fn test_patch_is_deterministic() {
        let first = patch_pipeline_script(JENKINS_CONFIG, "pipeline { stages {} }").unwrap();
        let second = patch_pipeline_script(JENKINS_CONFIG, "pipeline { stages {} }").unwrap();
        assert_eq!(first, second);
    }

    proptest! {
        #[test]
        fn prop_script_round_trips_and_header_is_kept(script in "[ -~\r\n\t]{0,200}") {
            let patched = patch_pipeline_script(JENKINS_CONFIG, &script).unwrap();
            let header = JobConfig::new(JENKINS_CONFIG).original_xml_header().to_string();
            prop_assert!(patched.starts_with(&header));
            prop_assert_eq!(script_text(&patched), script);
        }

        #[test]
        fn prop_content_outside_script_is_untouched(script in "[ -~\r\n]{0,80}") {
            let patched = patch_pipeline_script(JENKINS_CONFIG, &script).unwrap();
            let (before, _) = JENKINS_CONFIG.split_once("<script>").unwrap();
            let (_, after) = JENKINS_CONFIG.split_once("</script>").unwrap();
            let head = format!("{before}<script>");
            let tail = format!("</script>{after}");
            prop_assert!(patched.starts_with(&head));
            prop_assert!(patched.ends_with(&tail));
        }
    }
}
