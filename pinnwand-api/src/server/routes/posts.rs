use crate::server::{
    PostCache, Result, ServerError, ServerRouter, auth::AuthenticatedUser, json::Json,
};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use pinnwand_common::model::{
    Id,
    post::{PostMarker, PostText},
    user::UserMarker,
};
use pinnwand_db::client::DbClient;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_post(add_post)
        .typed_get(get_posts)
        .typed_delete(delete_post)
}

/// Runs after every committed post mutation, before the response is built, so
/// the owner's next read cannot see a pre-write snapshot.
fn invalidate_after_write(cache: &PostCache, owner: Id<UserMarker>) {
    cache.invalidate(owner);
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/AddPost", rejection(ServerError))]
struct AddPostPath();

/// Ownership comes from the verified token; a `user_id` field in the body is
/// ignored. Text length is checked during deserialization, before any store
/// call.
#[derive(Deserialize)]
struct AddPostRequest {
    text: PostText,
}

#[derive(Serialize)]
struct AddPostResponse {
    post_id: Id<PostMarker>,
}

async fn add_post(
    AddPostPath(): AddPostPath,
    State(db): State<Arc<DbClient>>,
    State(cache): State<Arc<PostCache>>,
    user: AuthenticatedUser,
    Json(request): Json<AddPostRequest>,
) -> Result<Json<AddPostResponse>> {
    let post_id = db.create_post(user.user_id(), &request.text).await?;

    invalidate_after_write(&cache, user.user_id());

    Ok(Json(AddPostResponse { post_id }))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/GetPosts", rejection(ServerError))]
struct GetPostsPath();

#[derive(Serialize)]
struct GetPostsResponse {
    posts: Vec<String>,
}

async fn get_posts(
    GetPostsPath(): GetPostsPath,
    State(db): State<Arc<DbClient>>,
    State(cache): State<Arc<PostCache>>,
    user: AuthenticatedUser,
) -> Result<Json<GetPostsResponse>> {
    let owner = user.user_id();

    if let Some(posts) = cache.get(owner) {
        return Ok(Json(GetPostsResponse { posts }));
    }

    let posts: Vec<String> = db
        .fetch_user_posts(owner)
        .await?
        .into_iter()
        .map(|post| post.text.into_inner())
        .collect();
    cache.put(owner, posts.clone());

    Ok(Json(GetPostsResponse { posts }))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/DeletePost/{post_id}", rejection(ServerError))]
struct DeletePostPath {
    post_id: Id<PostMarker>,
}

#[derive(Serialize)]
struct DeletePostResponse {
    message: String,
}

async fn delete_post(
    DeletePostPath { post_id }: DeletePostPath,
    State(db): State<Arc<DbClient>>,
    State(cache): State<Arc<PostCache>>,
    user: AuthenticatedUser,
) -> Result<Json<DeletePostResponse>> {
    let deleted = db.delete_post(post_id, user.user_id()).await?;
    if !deleted {
        return Err(ServerError::PostNotFound);
    }

    invalidate_after_write(&cache, user.user_id());

    Ok(Json(DeletePostResponse {
        message: "Post deleted".to_owned(),
    }))
}
