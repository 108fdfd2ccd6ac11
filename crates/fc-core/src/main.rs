use std::io::{self, IsTerminal, Read};

use fc_backend::HttpTransport;
use fc_core::config::Config;
use fc_core::conversation::{Conversation, ConversationSettings};
use fc_core::logging;
use fc_core::redraw::RedrawCoalescer;
use fc_core::render::ReplyPrinter;
use fc_core::repl::{run_interactive, run_one_shot, spawn_interrupt_listener, HELP_TEXT};
use tokio::io::BufReader;

fn print_help() {
    println!("feedchat: streaming chat client for the feed assistant");
    println!();
    println!("Usage:");
    println!("  feedchat                     Interactive mode");
    println!("  feedchat \"question\"          Ask once and exit");
    println!("  echo \"question\" | feedchat   Ask once via stdin pipe");
    println!();
    println!("Options:");
    println!("  --service <url>   Route messages through a tool service");
    println!("  --version         Print version");
    println!("  --help            Print this help");
    println!();
    println!("{HELP_TEXT}");
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return;
    }

    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("feedchat {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let mut service = None;
    let mut positional = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--service" {
            match iter.next() {
                Some(url) => service = Some(url.clone()),
                None => {
                    eprintln!("error: --service needs a url");
                    std::process::exit(2);
                }
            }
        } else if let Some(url) = arg.strip_prefix("--service=") {
            service = Some(url.to_string());
        } else if arg.starts_with('-') {
            eprintln!("error: unknown option '{arg}' (see --help)");
            std::process::exit(2);
        } else {
            positional.push(arg.clone());
        }
    }

    let config = Config::load_or_default();
    logging::init_logging(&config.log.level);

    let stdin_is_pipe = !io::stdin().is_terminal();
    let message = if !positional.is_empty() {
        Some(positional.join(" "))
    } else if stdin_is_pipe {
        let mut buf = String::new();
        if io::stdin().read_to_string(&mut buf).is_ok() && !buf.trim().is_empty() {
            Some(buf.trim().to_string())
        } else {
            None
        }
    } else {
        None
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to create async runtime: {e}");
            std::process::exit(1);
        }
    };

    let transport =
        match HttpTransport::new(config.server.stream_url(), config.server.connect_timeout()) {
            Ok(t) => t,
            Err(e) => {
                eprintln!("error: failed to create HTTP client: {e}");
                std::process::exit(1);
            }
        };

    let code = runtime.block_on(async {
        let mut conversation = Conversation::new(transport, ConversationSettings::from(&config));
        if let Some(url) = service.or_else(|| config.chat.service.clone()) {
            conversation.switch_service(Some(&url));
        }

        let mut printer = ReplyPrinter::new(io::stdout(), conversation.live_reply());
        let coalescer = RedrawCoalescer::spawn(config.ui.redraw_window(), move || printer.redraw());
        let mut conversation = conversation.with_redraw(coalescer.handle());

        let mut out = io::stdout();
        let mut interrupts = spawn_interrupt_listener();
        let code = match message {
            Some(message) => {
                run_one_shot(&mut conversation, &message, &mut out, &mut interrupts).await
            }
            None => {
                let input = BufReader::new(tokio::io::stdin());
                match run_interactive(&mut conversation, input, &mut out, &mut interrupts).await {
                    Ok(()) => 0,
                    Err(e) => {
                        eprintln!("error: {e}");
                        1
                    }
                }
            }
        };

        drop(conversation);
        coalescer.shutdown().await;
        code
    });

    std::process::exit(code);
}
