quantity!(Millivolts, "mV");
