use crate::routes::{convert, health, repo};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(info(
    title = "nextport-server",
    description = "React to Next.js App Router migration API",
    version = "0.1.0"
))]
pub struct ApiDoc;

pub fn get_docs() -> utoipa::openapi::OpenApi {
    let mut root = ApiDoc::openapi();
    root.merge(health::HealthApi::openapi());
    root.merge(convert::ConvertApi::openapi());
    root.merge(repo::RepoApi::openapi());
    root
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = get_docs();
        for path in [
            "/health",
            "/fetch",
            "/migrate",
            "/list-react-files",
            "/migrate-repo",
            "/download-zip",
        ] {
            assert!(doc.paths.paths.contains_key(path), "{path} missing from OpenAPI document");
        }
    }
}
