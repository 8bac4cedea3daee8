use crate::{
    auth::{AuthUser, PageUser},
    backend::Services,
    config::Config,
    models::todo::{sample_todos, NewTodo, Todo},
};
use actix_web::{HttpResponse, web};
use anyhow::Context;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

#[derive(Deserialize)]
pub struct AddTodoReq {
    pub title: String,
}

#[derive(Deserialize)]
pub struct DeleteTodoReq {
    pub id: String,
}

#[derive(Deserialize)]
pub struct ToggleTodoReq {
    pub id: String,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Serialize)]
struct TodoResp {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
pub struct TodoPage {
    pub email: Option<String>,
    pub todos: Vec<Todo>,
    pub error: Option<String>,
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> anyhow::Result<T> {
    serde_json::from_slice(body).context("invalid request body")
}

fn respond(result: anyhow::Result<()>, verb: &str) -> HttpResponse {
    match result {
        Ok(()) => HttpResponse::Ok().json(TodoResp { success: true, error: None }),
        Err(e) => {
            log::error!("failed to {verb} todo: {e:#}");
            HttpResponse::InternalServerError().json(TodoResp {
                success: false,
                error: Some(format!("Failed to {verb} todo")),
            })
        }
    }
}

fn token(user: &Option<AuthUser>) -> Option<&str> {
    user.as_ref().map(|u| u.access_token.as_str())
}

pub async fn todos_page(
    cfg: web::Data<Config>,
    services: web::Data<Services>,
    PageUser(user): PageUser,
) -> HttpResponse {
    let token = Some(user.access_token.as_str());
    let mut page = TodoPage { email: user.email.clone(), todos: Vec::new(), error: None };

    match services.todos.list(token).await {
        Ok(todos) if todos.is_empty() && cfg.seed_sample_todos => {
            log::info!("todo table is empty, inserting sample rows");
            if let Err(e) = services.todos.insert(token, &sample_todos()).await {
                log::error!("error seeding todos: {e:?}");
            }
            match services.todos.list(token).await {
                Ok(todos) => page.todos = todos,
                Err(e) => page.error = Some(e.to_string()),
            }
        }
        Ok(todos) => page.todos = todos,
        Err(e) => {
            log::error!("error fetching todos: {e:?}");
            page.error = Some(e.to_string());
        }
    }

    HttpResponse::Ok().json(page)
}

pub async fn add_todo(
    services: web::Data<Services>,
    user: Option<AuthUser>,
    body: web::Bytes,
) -> HttpResponse {
    let result = async {
        let req: AddTodoReq = parse_body(&body)?;
        anyhow::ensure!(!req.title.trim().is_empty(), "title is empty");
        services.todos.insert(token(&user), &[NewTodo::new(req.title)]).await?;
        Ok::<(), anyhow::Error>(())
    };
    respond(result.await, "add")
}

pub async fn delete_todo(
    services: web::Data<Services>,
    user: Option<AuthUser>,
    body: web::Bytes,
) -> HttpResponse {
    let result = async {
        let req: DeleteTodoReq = parse_body(&body)?;
        services.todos.delete(token(&user), &req.id).await?;
        Ok::<(), anyhow::Error>(())
    };
    respond(result.await, "delete")
}

pub async fn toggle_todo(
    services: web::Data<Services>,
    user: Option<AuthUser>,
    body: web::Bytes,
) -> HttpResponse {
    let result = async {
        let req: ToggleTodoReq = parse_body(&body)?;
        services.todos.set_completed(token(&user), &req.id, !req.completed).await?;
        Ok::<(), anyhow::Error>(())
    };
    respond(result.await, "toggle")
}
