#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    itinerary_map::run().await
}
