use vidlink_daemon::cli_args::{self, ReceiverOpt};

fn main() -> anyhow::Result<()> {
    let opt = cli_args::parse_or_exit::<ReceiverOpt>();
    vidlink_daemon::init_tracing(opt.verbose);
    vidlink_daemon::receiver::run(opt)
}
