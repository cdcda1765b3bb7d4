mod common;

use common::*;
use sourcery_rs::sourcemap::DATA_URL_PREFIX;
use sourcery_rs::{Options, SourceMap, SourceMappingUrl, load, load_sync};

const MINIFIED: &str = r#"(function(){var n;n=42,console.log("the answer is "+n)}).call(this);"#;

fn reload_and_trace(fixture: &Fixture, rel: &str) {
    let options = Options::default();
    let chain = load_sync(fixture.path(rel), &options).unwrap().unwrap();
    let traced = chain.trace(1, Some(31), &options).unwrap();
    assert_path(traced.source, &fixture.path("app.coffee"));
    assert_eq!((traced.line, traced.column, traced.name), (2, 8, Some("log")));
}

#[test]
fn test_write_to_new_destination() {
    let fixture = Fixture::app_chain();
    let options = Options::default();
    let mut chain = load_sync(fixture.path("app.min.js"), &options)
        .unwrap()
        .unwrap();

    let emit = chain
        .write_sync(Some(&fixture.path("out/app.min.js")), &options)
        .unwrap();
    assert_eq!(emit.dest, fixture.path("out/app.min.js"));

    assert_eq!(
        fixture.read("out/app.min.js"),
        format!("{MINIFIED}\n//# sourceMappingURL=app.min.js.map\n")
    );

    let map = SourceMap::parse(&fixture.read("out/app.min.js.map"), "out").unwrap();
    assert_eq!(map.file.as_deref(), Some("app.min.js"));
    assert_eq!(map.sources, vec![Some("../app.coffee".to_string())]);
    assert_eq!(map.sources_content, vec![Some(APP_COFFEE.to_string())]);
    assert_eq!(map.mappings, FLATTENED_MAPPINGS);

    reload_and_trace(&fixture, "out/app.min.js");
}

#[test]
fn test_write_overwrites_root_in_place() {
    let fixture = Fixture::app_chain();
    let options = Options::default();
    let mut chain = load_sync(fixture.path("app.min.js"), &options)
        .unwrap()
        .unwrap();
    chain.write_sync(None, &options).unwrap();

    let written = fixture.read("app.min.js");
    let lines = lines(&written);
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[1], "//# sourceMappingURL=app.min.js.map");
    assert_eq!(lines[2], "");

    let map = SourceMap::parse(&fixture.read("app.min.js.map"), "app").unwrap();
    assert_eq!(map.sources, vec![Some("app.coffee".to_string())]);

    reload_and_trace(&fixture, "app.min.js");
}

#[tokio::test]
async fn test_async_write() {
    let fixture = Fixture::app_chain();
    let options = Options::default();
    let mut chain = load(fixture.path("app.min.js"), &options)
        .await
        .unwrap()
        .unwrap();
    chain
        .write(Some(&fixture.path("async/app.min.js")), &options)
        .await
        .unwrap();

    assert!(fixture.path("async/app.min.js.map").exists());
    reload_and_trace(&fixture, "async/app.min.js");
}

#[test]
fn test_write_inline_map() {
    let fixture = Fixture::app_chain();
    let options = Options::default().with_legacy_flags(true, false);
    let mut chain = load_sync(fixture.path("app.min.js"), &options)
        .unwrap()
        .unwrap();
    let emit = chain
        .write_sync(Some(&fixture.path("inline/app.min.js")), &options)
        .unwrap();
    assert!(emit.inline);

    assert!(!fixture.path("inline/app.min.js.map").exists());
    let written = fixture.read("inline/app.min.js");
    assert!(written.contains(&format!("//# sourceMappingURL={DATA_URL_PREFIX}")));
    assert!(written.ends_with('\n'));

    reload_and_trace(&fixture, "inline/app.min.js");
}

#[test]
fn test_write_absolute_map_url() {
    let fixture = Fixture::app_chain();
    let options = Options {
        source_mapping_url: SourceMappingUrl::AbsolutePath,
        ..Options::default()
    };
    let mut chain = load_sync(fixture.path("app.min.js"), &options)
        .unwrap()
        .unwrap();
    chain
        .write_sync(Some(&fixture.path("abs/app.min.js")), &options)
        .unwrap();

    let map_path = fixture.path("abs/app.min.js.map");
    let expected = format!("//# sourceMappingURL={}", map_path.display());
    assert!(fixture.read("abs/app.min.js").contains(&expected));

    reload_and_trace(&fixture, "abs/app.min.js");
}

#[test]
fn test_write_with_base() {
    let fixture = Fixture::app_chain();
    let options = Options {
        base: Some(fixture.path("x/y/z")),
        ..Options::default()
    };
    let mut chain = load_sync(fixture.path("app.min.js"), &options)
        .unwrap()
        .unwrap();
    chain
        .write_sync(Some(&fixture.path("based/app.min.js")), &options)
        .unwrap();

    let map = SourceMap::parse(&fixture.read("based/app.min.js.map"), "based").unwrap();
    assert_eq!(map.sources, vec![Some("../../../app.coffee".to_string())]);
}

#[test]
fn test_write_base_path_map_url() {
    let fixture = Fixture::app_chain();
    let options = Options {
        base: Some(fixture.dir.path().to_path_buf()),
        source_mapping_url: SourceMappingUrl::BasePath,
        ..Options::default()
    };
    let mut chain = load_sync(fixture.path("app.min.js"), &options)
        .unwrap()
        .unwrap();
    chain
        .write_sync(Some(&fixture.path("dist/app.min.js")), &options)
        .unwrap();

    assert!(
        fixture
            .read("dist/app.min.js")
            .contains("//# sourceMappingURL=dist/app.min.js.map")
    );
}

#[test]
fn test_write_css_uses_block_comment() {
    let fixture = Fixture::new();
    fixture.write("styles.css", "a{color:red}\n/*# sourceMappingURL=styles.css.map */\n");
    fixture.write(
        "styles.css.map",
        r#"{"version":3,"sources":["styles.less"],"sourcesContent":["a {\n  color: red;\n}"],"names":[],"mappings":"AAAA,EACE"}"#,
    );

    let options = Options::default();
    let mut chain = load_sync(fixture.path("styles.css"), &options)
        .unwrap()
        .unwrap();
    chain
        .write_sync(Some(&fixture.path("out/styles.css")), &options)
        .unwrap();

    assert_eq!(
        fixture.read("out/styles.css"),
        "a{color:red}\n/*# sourceMappingURL=styles.css.map */\n"
    );
    let map = SourceMap::parse(&fixture.read("out/styles.css.map"), "css").unwrap();
    assert_eq!(map.sources, vec![Some("../styles.less".to_string())]);
}

#[test]
fn test_write_encodes_spaces_in_map_url() {
    let fixture = Fixture::new();
    fixture.write("src.js", "x;\n//# sourceMappingURL=src.js.map\n");
    fixture.write(
        "src.js.map",
        r#"{"version":3,"sources":["original.js"],"sourcesContent":["y"],"names":[],"mappings":"AAAA"}"#,
    );

    let options = Options::default();
    let mut chain = load_sync(fixture.path("src.js"), &options)
        .unwrap()
        .unwrap();
    chain
        .write_sync(Some(&fixture.path("out/file with spaces.js")), &options)
        .unwrap();

    assert!(fixture.path("out/file with spaces.js.map").exists());
    assert_eq!(
        fixture.read("out/file with spaces.js"),
        "x;\n//# sourceMappingURL=file%20with%20spaces.js.map\n"
    );

    let chain = load_sync(fixture.path("out/file with spaces.js"), &options)
        .unwrap()
        .unwrap();
    let traced = chain.trace(1, Some(0), &options).unwrap();
    assert_path(traced.source, &fixture.path("original.js"));
}

#[test]
fn test_content_and_map_leaves_disk_alone() {
    let fixture = Fixture::app_chain();
    let options = Options {
        exclude_content: true,
        ..Options::default()
    };
    let mut chain = load_sync(fixture.path("app.min.js"), &options)
        .unwrap()
        .unwrap();

    let emit = chain
        .content_and_map(Some(&fixture.path("dry/app.min.js")), &options)
        .unwrap();
    assert!(!fixture.path("dry").exists());
    assert_eq!(emit.map_path(), fixture.path("dry/app.min.js.map"));

    let (map_path, json) = emit.map_file().unwrap().unwrap();
    assert_eq!(map_path, fixture.path("dry/app.min.js.map"));
    let map = SourceMap::parse(&json, "dry").unwrap();
    assert_eq!(map.sources_content, vec![None]);
    assert!(emit.content.unwrap().ends_with("app.min.js.map\n"));
}
