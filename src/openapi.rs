use utoipa::OpenApi;

use crate::{api, apikey};

#[derive(OpenApi)]
#[openapi(
    paths(
        api::index,
        api::health,
        api::generate,
        api::download,
        api::keys_validate,
        api::keys_create,
        api::keys_list,
        api::keys_revoke,
    ),
    components(
        schemas(
            api::GenerateRequest,
            api::CreateKeyRequest,
            api::RevokeKeyRequest,
            apikey::KeyInfo,
            apikey::KeyMeta,
        )
    ),
    tags(
        (name = "cardgen", description = "ID card generator API")
    )
)]
pub struct ApiDoc;
