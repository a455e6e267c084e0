use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    let addr = std::env::var("MOCK_SERVER_ADDR").unwrap_or_else(|_| {
        let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
        format!("127.0.0.1:{port}")
    });
    let listener = TcpListener::bind(&addr).await?;
    let local = listener.local_addr()?;

    println!("requestor mock server on http://{local}");
    for (method, path) in mock_server::ROUTES {
        println!("  {method:<6} {path}");
    }
    mock_server::run(listener).await
}
