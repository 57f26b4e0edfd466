use vidlink_daemon::cli_args::{self, SenderOpt};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let opt = cli_args::parse_or_exit::<SenderOpt>();
    vidlink_daemon::init_tracing(opt.verbose);
    vidlink_daemon::sender::run(opt).await
}
