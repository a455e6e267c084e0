use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{OriginalUri, Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

/// Body served by `/string-array`: valid JSON with deliberately irregular
/// whitespace.
pub const STRING_ARRAY_BODY: &str = "[ \"Some\",\"string\" ,\n  \"array\",   \"response\"]";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Book {
    pub id: Uuid,
    pub title: String,
    pub author: String,
}

#[derive(Deserialize)]
pub struct CreateBook {
    pub title: String,
    pub author: String,
}

#[derive(Deserialize)]
pub struct UpdateBook {
    pub title: Option<String>,
    pub author: Option<String>,
}

#[derive(Deserialize)]
pub struct BookFilter {
    pub author: Option<String>,
}

pub type Db = Arc<RwLock<HashMap<Uuid, Book>>>;

/// Routes served by [`app`], as `(method, path)` pairs.
pub const ROUTES: &[(&str, &str)] = &[
    ("POST", "/person"),
    ("GET", "/string-array"),
    ("GET", "/failure"),
    ("GET", "/echo/{*rest}"),
    ("GET", "/server/books?author="),
    ("POST", "/server/books"),
    ("GET", "/server/books/{id}"),
    ("PUT", "/server/books/{id}"),
    ("DELETE", "/server/books/{id}"),
];

type Rejection = (StatusCode, &'static str);

/// Trimmed `value`, or 422 naming the blank `field`.
fn required(value: &str, field: &'static str) -> Result<String, Rejection> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err((StatusCode::UNPROCESSABLE_ENTITY, field));
    }
    Ok(trimmed.to_string())
}

impl Book {
    fn same_work(&self, title: &str, author: &str) -> bool {
        self.title.eq_ignore_ascii_case(title) && self.author.eq_ignore_ascii_case(author)
    }
}

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(HashMap::new()));
    Router::new()
        .route("/person", post(echo_person))
        .route("/string-array", get(string_array))
        .route("/failure", get(failure))
        .route("/echo/{*rest}", get(echo_uri))
        .route("/server/books", get(list_books).post(create_book))
        .route("/server/books/{id}", get(get_book).put(update_book).delete(delete_book))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

/// Returns the posted person unchanged.
async fn echo_person(Json(person): Json<serde_json::Value>) -> Json<serde_json::Value> {
    Json(person)
}

async fn string_array() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/json")], STRING_ARRAY_BODY)
}

async fn failure() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "no such resource")
}

/// Reports the request path and query exactly as received.
async fn echo_uri(OriginalUri(uri): OriginalUri) -> String {
    uri.to_string()
}

async fn list_books(State(db): State<Db>, Query(filter): Query<BookFilter>) -> Json<Vec<Book>> {
    let books = db.read().await;
    let mut matching: Vec<Book> = books
        .values()
        .filter(|b| filter.author.as_ref().map_or(true, |author| &b.author == author))
        .cloned()
        .collect();
    matching.sort_by(|a, b| a.title.cmp(&b.title));
    Json(matching)
}

/// Stores a new book. Title and author are trimmed and must not be blank;
/// the same title by the same author is stored only once.
async fn create_book(
    State(db): State<Db>,
    Json(input): Json<CreateBook>,
) -> Result<(StatusCode, Json<Book>), Rejection> {
    let title = required(&input.title, "title must not be blank")?;
    let author = required(&input.author, "author must not be blank")?;

    let mut books = db.write().await;
    if books.values().any(|b| b.same_work(&title, &author)) {
        return Err((StatusCode::CONFLICT, "book already exists"));
    }
    let book = Book {
        id: Uuid::new_v4(),
        title,
        author,
    };
    books.insert(book.id, book.clone());
    Ok((StatusCode::CREATED, Json(book)))
}

async fn get_book(
    State(db): State<Db>,
    Path(id): Path<Uuid>,
) -> Result<Json<Book>, StatusCode> {
    let books = db.read().await;
    books.get(&id).cloned().map(Json).ok_or(StatusCode::NOT_FOUND)
}

/// Applies the fields present in the body. A present field follows the
/// same rules as on create.
async fn update_book(
    State(db): State<Db>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateBook>,
) -> Result<Json<Book>, Rejection> {
    let title = input
        .title
        .map(|t| required(&t, "title must not be blank"))
        .transpose()?;
    let author = input
        .author
        .map(|a| required(&a, "author must not be blank"))
        .transpose()?;

    let mut books = db.write().await;
    let book = books
        .get_mut(&id)
        .ok_or((StatusCode::NOT_FOUND, "no such book"))?;
    if let Some(title) = title {
        book.title = title;
    }
    if let Some(author) = author {
        book.author = author;
    }
    Ok(Json(book.clone()))
}

async fn delete_book(
    State(db): State<Db>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, StatusCode> {
    let mut books = db.write().await;
    books.remove(&id).map(|_| StatusCode::NO_CONTENT).ok_or(StatusCode::NOT_FOUND)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_array_body_is_valid_json() {
        let items: Vec<String> = serde_json::from_str(STRING_ARRAY_BODY).unwrap();
        assert_eq!(items, vec!["Some", "string", "array", "response"]);
    }

    #[test]
    fn create_book_requires_author() {
        let result: Result<CreateBook, _> = serde_json::from_str(r#"{"title":"Dune"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn required_trims_and_rejects_blank() {
        assert_eq!(required("  Dune ", "title").unwrap(), "Dune");
        let (status, message) = required(" \t\n", "title must not be blank").unwrap_err();
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(message, "title must not be blank");
    }

    #[test]
    fn same_work_ignores_ascii_case() {
        let book = Book {
            id: Uuid::nil(),
            title: "Emma".to_string(),
            author: "Austen".to_string(),
        };
        assert!(book.same_work("EMMA", "austen"));
        assert!(!book.same_work("Emma", "Bronte"));
    }

    #[test]
    fn update_book_all_fields_optional() {
        let input: UpdateBook = serde_json::from_str(r#"{}"#).unwrap();
        assert!(input.title.is_none());
        assert!(input.author.is_none());
    }
}
