use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    labtriage::init_tracing();

    match labtriage::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
