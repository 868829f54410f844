#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    optipath::app::run().await
}
