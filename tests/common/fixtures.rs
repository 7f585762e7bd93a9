//! Records, payloads and mock routes

use flate2::Compression;
use flate2::write::GzEncoder;
use objaverse_dl::{AnnotationTable, ObjectRecord, Source};
use std::io::Write;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const CHAIR_GLB: &[u8] = b"glTF\x02\x00\x00\x00chair";
pub const TABLE_GLB: &[u8] = b"glTF\x02\x00\x00\x00table";
pub const CUBE_STL: &[u8] = b"solid cube\nendsolid cube\n";

/// Lowercase hex SHA-256
pub fn sha256_hex(bytes: &[u8]) -> String {
    objaverse_dl::utils::bytes_sha256(bytes)
}

/// Record whose expected hash matches `body`
pub fn record_for(file_identifier: &str, source: Source, body: &[u8]) -> ObjectRecord {
    ObjectRecord::new(file_identifier, source, sha256_hex(body))
}

pub fn table(records: Vec<ObjectRecord>) -> AnnotationTable {
    AnnotationTable::new(records)
}

/// Serve `body` for GET `route`, expecting exactly `times` requests
pub async fn serve(server: &MockServer, route: &str, body: &[u8], times: u64) {
    Mock::given(method("GET"))
        .and(path(route.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
        .expect(times)
        .mount(server)
        .await;
}

/// Answer GET `route` with `status`
pub async fn serve_status(server: &MockServer, route: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path(route.to_string()))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

/// Gzipped JSON object index as served by the Objaverse 1.0 mirror
pub fn object_paths_gz(entries: &[(&str, &str)]) -> Vec<u8> {
    let index: serde_json::Map<String, serde_json::Value> = entries
        .iter()
        .map(|(uid, path)| (uid.to_string(), serde_json::Value::from(*path)))
        .collect();
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(serde_json::to_string(&index).unwrap().as_bytes())
        .unwrap();
    encoder.finish().unwrap()
}
