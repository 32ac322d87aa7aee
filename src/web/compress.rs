use async_compression::tokio::{bufread::GzipDecoder, write::GzipEncoder};
use axum::http::{header, HeaderMap};
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Gzip `data` in memory
pub async fn gzip(data: &[u8]) -> std::io::Result<Bytes> {
    let mut encoder = GzipEncoder::new(Vec::new());
    encoder.write_all(data).await?;
    encoder.shutdown().await?;
    Ok(Bytes::from(encoder.into_inner()))
}

pub async fn gunzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = GzipDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).await?;
    Ok(out)
}

/// Whether the client's `Accept-Encoding` allows a gzip body
pub fn accepts_gzip(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::ACCEPT_ENCODING)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.to_ascii_lowercase().contains("gzip"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[tokio::test]
    async fn test_gzip_payload_is_smaller_and_restorable() {
        let page = "<li>entry</li>\n".repeat(200);
        let packed = gzip(page.as_bytes()).await.unwrap();
        assert!(packed.len() < page.len());
        assert_eq!(&packed[..2], &[0x1f, 0x8b]);
        assert_eq!(gunzip(&packed).await.unwrap(), page.as_bytes());
    }

    #[test]
    fn test_accepts_gzip() {
        let mut headers = HeaderMap::new();
        assert!(!accepts_gzip(&headers));
        headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("deflate, GZIP;q=0.8"));
        assert!(accepts_gzip(&headers));
        headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("br"));
        assert!(!accepts_gzip(&headers));
    }
}
