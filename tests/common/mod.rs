#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const APP_COFFEE: &str = "answer = 40 + 2\nconsole.log \"the answer is #{answer}\"";

pub const APP_JS: &str = r#"(function() {
  var answer;

  answer = 40 + 2;

  console.log("the answer is " + answer);

}).call(this);
//# sourceMappingURL=app.js.map
"#;

pub const APP_JS_MAPPINGS: &str = "AAAA;AAAA,MAAA,MAAA;;AAAA,EAAA,MAAA,GAAS,EAAA,GAAK,CAAd,CAAA;;AAAA,EACA,OAAO,CAAC,GAAR,CAAa,gBAAA,GAAe,MAA5B,CADA,CAAA;AAAA";

pub const APP_MIN_JS: &str = r#"(function(){var n;n=42,console.log("the answer is "+n)}).call(this);
//# sourceMappingURL=app.min.js.map
"#;

/// Includes a 1-field segment at column 54 and an untraceable one at 57.
pub const APP_MIN_MAPPINGS: &str = "AAAA,YACE,IAAIA,EAEJA,EAAS,GAETC,QAAQC,IAAI,iBAAmBF,E,GAE9B";

pub const FLATTENED_MAPPINGS: &str = "AAAA,YAAA,IAAAA,EAAAA,EAAS,GACTC,QAAQC,IAAK,iBAAeF";

pub struct Fixture {
    pub dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    pub fn write(&self, rel: &str, contents: &str) -> PathBuf {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, contents).unwrap();
        path
    }

    pub fn write_map(&self, rel: &str, sources: &[&str], names: &[&str], mappings: &str) -> PathBuf {
        let json = serde_json::json!({
            "version": 3,
            "file": rel,
            "sources": sources,
            "names": names,
            "mappings": mappings,
        });
        self.write(rel, &json.to_string())
    }

    pub fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.path(rel)).unwrap()
    }

    /// app.coffee -> app.js -> app.min.js, each step with an external map.
    pub fn app_chain() -> Self {
        let fixture = Self::new();
        fixture.write("app.coffee", APP_COFFEE);
        fixture.write("app.js", APP_JS);
        fixture.write(
            "app.js.map",
            &serde_json::json!({
                "version": 3,
                "file": "app.js",
                "sources": ["app.coffee"],
                "sourcesContent": [null],
                "names": [],
                "mappings": APP_JS_MAPPINGS,
            })
            .to_string(),
        );
        fixture.write("app.min.js", APP_MIN_JS);
        fixture.write_map(
            "app.min.js.map",
            &["app.js"],
            &["answer", "console", "log"],
            APP_MIN_MAPPINGS,
        );
        fixture
    }
}

pub fn lines(text: &str) -> Vec<&str> {
    text.split('\n').collect()
}

pub fn assert_path(actual: Option<&Path>, expected: &Path) {
    assert_eq!(actual, Some(expected));
}
