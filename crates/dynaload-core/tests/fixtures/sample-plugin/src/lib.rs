//! Sample plugin used by the integration tests.

use std::sync::atomic::{AtomicI64, Ordering};

use dynaload_plugin_sdk::prelude::*;

static CALLS: AtomicI64 = AtomicI64::new(0);

fn add(args: &mut CallArgs<'_>) {
    let a = args.get_int("a").unwrap_or(0);
    let b = args.get_int("b").unwrap_or(0);
    args.set_int("sum", a + b);
}

fn scale(args: &mut CallArgs<'_>) {
    let (Some(x), Some(factor)) = (args.get_double("x"), args.get_double("factor")) else {
        args.set_str("error", "x and factor must be doubles");
        return;
    };
    args.set_double("x", x * factor);
}

fn greet(args: &mut CallArgs<'_>) {
    let name = args.get_str("name").unwrap_or_else(|| "world".to_string());
    let greeting = format!("hello, {} from {}", name, args.host());
    args.set_str("greeting", &greeting);
}

/// Reports what each typed getter sees.
fn inspect(args: &mut CallArgs<'_>) {
    let obj = args.get_object("image", "Imager");
    args.set_int("image_found", i64::from(obj.is_some()));
    if let Some(ptr) = obj {
        args.set_ptr("image_ptr", ptr);
    }

    let width = args.get_int("width");
    args.set_int("width_found", i64::from(width.is_some()));
    if let Some(width) = width {
        args.set_int("width_seen", width);
    }

    let gamma = args.get_double("gamma");
    args.set_int("gamma_found", i64::from(gamma.is_some()));
    if let Some(gamma) = gamma {
        args.set_double("gamma_seen", gamma);
    }

    let data = args.get_ptr("data");
    args.set_int("data_found", i64::from(data.is_some()));
    if let Some(data) = data {
        args.set_ptr("data_seen", data);
    }

    args.set_int("missing_found", i64::from(args.contains("missing")));
}

fn count_calls(args: &mut CallArgs<'_>) {
    let calls = CALLS.fetch_add(1, Ordering::SeqCst) + 1;
    args.set_int("calls", calls);
}

fn log(args: &mut CallArgs<'_>) {
    let message = args.get_str("message").unwrap_or_default();
    args.log(log_level::INFO, &message);
    args.remove("message");
}

export_plugin! {
    evalstr: "sample plugin: arithmetic, strings and store inspection",
    functions: [
        { name: "add", signature: "a:int b:int -> sum:int", call: add },
        { name: "scale", signature: "x:double factor:double -> x:double", call: scale },
        { name: "greet", signature: "name:str -> greeting:str", call: greet },
        { name: "inspect", signature: "image:Imager width:int gamma:double data:ptr", call: inspect },
        { name: "count_calls", signature: "-> calls:int", call: count_calls },
        { name: "log", signature: "message:str", call: log },
    ],
}
